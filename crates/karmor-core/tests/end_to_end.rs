//! End-to-end pipeline scenarios, exercised through the public `Pipeline`
//! API rather than individual module internals.

use karmor_common::{event_id, RawSyscallRecord};
use karmor_core::{Container, EventOrigin, LocalSink, Pipeline, PipelineConfig};
use karmor_policy::index::PolicyEvent;
use karmor_policy::{Action, FileRule, MatchPath, PolicyMetadata, PolicySpec, SecurityPolicy, Selector};

fn nginx_container() -> Container {
    Container {
        container_id: "c1".into(),
        container_name: "nginx".into(),
        host_name: "node-1".into(),
        host_ip: "10.0.0.1".into(),
        namespace: "ns1".into(),
        pod_group_name: "web".into(),
        image: "nginx:latest".into(),
        labels: vec![],
        identities: vec!["web".into()],
        apparmor_profile: None,
        selinux_profile: None,
        host_volumes: vec![],
    }
}

fn openat_passwd_record() -> RawSyscallRecord {
    let mut r = RawSyscallRecord::zeroed();
    r.host_pid = 42;
    r.ppid = 1;
    r.pid = 7;
    r.event_id = event_id::OPENAT;
    r.comm[..5].copy_from_slice(b"nginx");
    let data = b"-100\0/etc/passwd\00";
    r.data[..data.len()].copy_from_slice(data);
    r
}

fn deny_passwd_policy() -> SecurityPolicy {
    SecurityPolicy {
        metadata: PolicyMetadata { name: "deny-passwd".into(), namespace: Some("ns1".into()) },
        spec: PolicySpec {
            severity: 7,
            tags: vec![],
            message: "no".into(),
            selector: Selector { match_names: vec!["web".into()], match_labels: Default::default(), identities: vec![] },
            process: None,
            file: Some(FileRule {
                match_paths: vec![MatchPath { path: "/etc/passwd".into(), owner_only: false, read_only: false, from_source: vec![] }],
                match_directories: vec![],
                match_patterns: vec![],
            }),
            network: None,
            capabilities: None,
            action: Action::Block,
        },
    }
}

#[tokio::test]
async fn full_pipeline_round_trip() {
    let pipeline = Pipeline::new(PipelineConfig::default(), LocalSink::None);
    pipeline.registry.upsert(nginx_container());

    let (mut rx_all, _guard_all) = pipeline.feeder.subscribe_logs(String::new(), 16);
    let (mut rx_policy, _guard_policy) = pipeline.feeder.subscribe_logs("policy".into(), 16);

    let origin = EventOrigin { container_id: "c1".into(), host_name: "node-1".into(), cluster_name: "default".into() };

    // S1: unmatched container log.
    pipeline.ingest_one(&openat_passwd_record(), &origin, 1000);
    let s1 = rx_all.recv().await.expect("S1 log delivered to unfiltered subscriber");
    assert_eq!(s1.container_id, "c1");
    assert_eq!(s1.namespace_name, "ns1");
    assert_eq!(s1.resource, "/etc/passwd");
    assert!(rx_policy.try_recv().is_err(), "S1 is unmatched, policy subscriber sees nothing yet");

    // S3: same event now matches a policy.
    pipeline.policy_index.apply(PolicyEvent::Added(deny_passwd_policy()));
    pipeline.ingest_one(&openat_passwd_record(), &origin, 1001);

    let s3_all = rx_all.recv().await.expect("S3 log delivered to unfiltered subscriber");
    assert_eq!(s3_all.policy_name.as_deref(), Some("deny-passwd"));
    assert_eq!(s3_all.severity, Some(7));

    let s3_policy = rx_policy.recv().await.expect("S3 log delivered to policy-filtered subscriber");
    assert_eq!(s3_policy.policy_name.as_deref(), Some("deny-passwd"));
}

#[tokio::test]
async fn auditd_suppression_drops_eacces_opens() {
    let mut config = PipelineConfig::default();
    config.enable_auditd = true;
    let pipeline = Pipeline::new(config, LocalSink::None);
    pipeline.registry.upsert(nginx_container());

    let (mut rx, _guard) = pipeline.feeder.subscribe_logs(String::new(), 16);
    let origin = EventOrigin { container_id: "c1".into(), host_name: "node-1".into(), cluster_name: "default".into() };

    let mut record = openat_passwd_record();
    record.retval = -13; // EACCES
    pipeline.ingest_one(&record, &origin, 1000);

    assert!(rx.try_recv().is_err(), "EACCES open is suppressed when auditd is enabled");
}
