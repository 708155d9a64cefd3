//! Generated gRPC types and service traits for the Karmor streaming RPC
//! plane, compiled at build time by `tonic-build`.

#![allow(clippy::all)]

tonic::include_proto!("karmor");
