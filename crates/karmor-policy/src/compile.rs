//! Expand a raw [`SecurityPolicy`]/[`HostSecurityPolicy`] document into
//! flattened [`MatchPolicy`] records.
//!
//! Invariant: every raw policy expands into at least one `MatchPolicy`; the
//! expansion order does not affect the result (tie-break is handled purely
//! by [`MatchPolicy::precedence_key`] at match time).

use crate::document::{
    Action, CapabilitiesRule, FileRule, HostSecurityPolicy, MatchDirectory, MatchPath,
    MatchPattern, NetworkRule, PolicySpec, ProcessRule, Selector, SecurityPolicy,
};
use crate::model::{MatchMode, MatchPolicy, Operation};

pub fn compile(policy: &SecurityPolicy) -> Vec<MatchPolicy> {
    compile_spec(&policy.metadata.name, &policy.spec_as_common(), false)
}

pub fn compile_host(policy: &HostSecurityPolicy) -> Vec<MatchPolicy> {
    compile_spec(&policy.metadata.name, &policy.spec_as_common(), true)
}

/// A borrow-free common view over `PolicySpec`/`HostPolicySpec`, so the
/// expansion logic below is written once.
struct CommonSpec<'a> {
    severity: u32,
    tags: &'a [String],
    message: &'a str,
    selector: &'a Selector,
    process: Option<&'a ProcessRule>,
    file: Option<&'a FileRule>,
    network: Option<&'a NetworkRule>,
    capabilities: Option<&'a CapabilitiesRule>,
    action: Action,
}

trait AsCommonSpec {
    fn spec_as_common(&self) -> CommonSpec<'_>;
}

impl AsCommonSpec for SecurityPolicy {
    fn spec_as_common(&self) -> CommonSpec<'_> {
        CommonSpec {
            severity: self.spec.severity,
            tags: &self.spec.tags,
            message: &self.spec.message,
            selector: &self.spec.selector,
            process: self.spec.process.as_ref(),
            file: self.spec.file.as_ref(),
            network: self.spec.network.as_ref(),
            capabilities: self.spec.capabilities.as_ref(),
            action: self.spec.action,
        }
    }
}

impl AsCommonSpec for HostSecurityPolicy {
    fn spec_as_common(&self) -> CommonSpec<'_> {
        CommonSpec {
            severity: self.spec.severity,
            tags: &self.spec.tags,
            message: &self.spec.message,
            selector: &self.spec.node_selector,
            process: self.spec.process.as_ref(),
            file: self.spec.file.as_ref(),
            network: self.spec.network.as_ref(),
            capabilities: self.spec.capabilities.as_ref(),
            action: self.spec.action,
        }
    }
}

fn compile_spec(policy_name: &str, spec: &CommonSpec<'_>, is_host_policy: bool) -> Vec<MatchPolicy> {
    let mut out = Vec::new();
    let base = |operation: Operation| MatchPolicy {
        policy_name: policy_name.to_string(),
        severity: spec.severity,
        tags: spec.tags.to_vec(),
        message: spec.message.to_string(),
        operation,
        source_mode: MatchMode::Any,
        source: String::new(),
        resource_mode: MatchMode::Any,
        resource: String::new(),
        owner_only: false,
        read_only: false,
        action: spec.action,
        selector_match_names: spec.selector.match_names.clone(),
        selector_match_labels: spec.selector.match_labels.clone(),
        selector_identities: spec.selector.identities.clone(),
        is_host_policy,
    };

    if let Some(process) = spec.process {
        expand_rule(Operation::Process, process.match_paths.as_slice(), process.match_directories.as_slice(), process.match_patterns.as_slice(), &base, &mut out);
    }
    if let Some(file) = spec.file {
        expand_rule(Operation::File, file.match_paths.as_slice(), file.match_directories.as_slice(), file.match_patterns.as_slice(), &base, &mut out);
    }
    if let Some(network) = spec.network {
        for protocol in &network.protocols {
            let mut mp = base(Operation::Network);
            mp.resource_mode = MatchMode::Exact;
            mp.resource = protocol.clone();
            out.push(mp);
        }
    }
    if let Some(capabilities) = spec.capabilities {
        for cap in &capabilities.match_capabilities {
            let mut mp = base(Operation::Capabilities);
            mp.resource_mode = MatchMode::Exact;
            mp.resource = cap.clone();
            out.push(mp);
        }
    }

    out
}

fn expand_rule(
    operation: Operation,
    paths: &[MatchPath],
    directories: &[MatchDirectory],
    patterns: &[MatchPattern],
    base: &dyn Fn(Operation) -> MatchPolicy,
    out: &mut Vec<MatchPolicy>,
) {
    for p in paths {
        for source in from_source_or_any(&p.from_source) {
            let mut mp = base(operation);
            mp.resource_mode = MatchMode::Exact;
            mp.resource = p.path.clone();
            mp.owner_only = p.owner_only;
            mp.read_only = p.read_only;
            apply_source(&mut mp, source);
            out.push(mp);
        }
    }
    for d in directories {
        for source in from_source_or_any(&d.from_source) {
            let mut mp = base(operation);
            // Recursive directories match any depth below the prefix;
            // non-recursive directories still compile to a Prefix matcher
            // but the matcher only accepts paths with no further `/`
            // (enforced in crate::matching).
            mp.resource_mode = MatchMode::Prefix;
            mp.resource = normalize_dir_prefix(&d.directory);
            mp.owner_only = d.owner_only;
            mp.read_only = d.read_only;
            if !d.recursive {
                mp.tags.push("__non_recursive".to_string());
            }
            apply_source(&mut mp, source);
            out.push(mp);
        }
    }
    for pat in patterns {
        for source in from_source_or_any(&pat.from_source) {
            let mut mp = base(operation);
            mp.resource_mode = MatchMode::Pattern;
            mp.resource = pat.pattern.clone();
            mp.owner_only = pat.owner_only;
            mp.read_only = pat.read_only;
            apply_source(&mut mp, source);
            out.push(mp);
        }
    }
}

fn from_source_or_any(from_source: &[String]) -> Vec<Option<&str>> {
    if from_source.is_empty() {
        vec![None]
    } else {
        from_source.iter().map(|s| Some(s.as_str())).collect()
    }
}

fn apply_source(mp: &mut MatchPolicy, source: Option<&str>) {
    match source {
        None => {
            mp.source_mode = MatchMode::Any;
            mp.source.clear();
        }
        Some(s) => {
            mp.source_mode = MatchMode::Exact;
            mp.source = s.to_string();
        }
    }
}

fn normalize_dir_prefix(dir: &str) -> String {
    if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::*;

    fn policy(action: Action) -> SecurityPolicy {
        SecurityPolicy {
            metadata: PolicyMetadata { name: "deny-passwd".into(), namespace: None },
            spec: PolicySpec {
                severity: 7,
                tags: vec![],
                message: "no".into(),
                selector: Selector {
                    match_names: vec!["web".into()],
                    match_labels: Default::default(),
                    identities: vec![],
                },
                process: None,
                file: Some(FileRule {
                    match_paths: vec![MatchPath {
                        path: "/etc/passwd".into(),
                        owner_only: false,
                        read_only: false,
                        from_source: vec![],
                    }],
                    match_directories: vec![],
                    match_patterns: vec![],
                }),
                network: None,
                capabilities: None,
                action,
            },
        }
    }

    #[test]
    fn expands_to_at_least_one_match_policy() {
        let compiled = compile(&policy(Action::Block));
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].operation, Operation::File);
        assert_eq!(compiled[0].resource, "/etc/passwd");
        assert_eq!(compiled[0].action, Action::Block);
        assert_eq!(compiled[0].resource_mode, MatchMode::Exact);
    }

    #[test]
    fn directory_rule_compiles_to_prefix() {
        let mut p = policy(Action::Audit);
        p.spec.file = Some(FileRule {
            match_paths: vec![],
            match_directories: vec![MatchDirectory {
                directory: "/etc".into(),
                recursive: true,
                owner_only: false,
                read_only: false,
                from_source: vec![],
            }],
            match_patterns: vec![],
        });
        let compiled = compile(&p);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].resource_mode, MatchMode::Prefix);
        assert_eq!(compiled[0].resource, "/etc/");
    }

    #[test]
    fn from_source_fans_out_one_rule_per_source() {
        let mut p = policy(Action::Block);
        p.spec.file = Some(FileRule {
            match_paths: vec![MatchPath {
                path: "/etc/shadow".into(),
                owner_only: false,
                read_only: false,
                from_source: vec!["/bin/cat".into(), "/bin/vi".into()],
            }],
            match_directories: vec![],
            match_patterns: vec![],
        });
        let compiled = compile(&p);
        assert_eq!(compiled.len(), 2);
        assert!(compiled.iter().all(|m| m.source_mode == MatchMode::Exact));
    }
}
