use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use relock_core::{
    is_full_sha, is_oci_digest, Error, LockDocument, LockMetadata, Result, ServiceBuildRef,
    ServiceLock,
};

/// Fresh lock metadata stamped with the current UTC time.
pub fn metadata_now(
    generator_id: impl Into<String>,
    source_branch: impl Into<String>,
    monorepo_commit_sha: impl Into<String>,
) -> LockMetadata {
    LockMetadata {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        generator_id: generator_id.into(),
        source_branch: source_branch.into(),
        monorepo_commit_sha: monorepo_commit_sha.into(),
    }
}

/// Assemble resolved refs plus metadata into a validated lock document.
///
/// Deterministic modulo `generated_at`: identical inputs produce an
/// identical `services` mapping, so two runs can be diffed for drift.
pub fn build(resolved: Vec<ServiceBuildRef>, metadata: LockMetadata) -> Result<LockDocument> {
    if resolved.is_empty() {
        return Err(Error::Validation("no resolved services to lock".into()));
    }

    let mut services: BTreeMap<String, ServiceLock> = BTreeMap::new();
    for r in resolved {
        let (name, entry) = r.into_entry();
        if services.insert(name.clone(), entry).is_some() {
            return Err(Error::Validation(format!("duplicate service name '{name}'")));
        }
    }

    let doc = LockDocument { metadata, services };
    validate_document(&doc)?;
    Ok(doc)
}

/// Schema validation run before a document is stored or consumed.
/// Failures name the offending field and service.
pub fn validate_document(doc: &LockDocument) -> Result<()> {
    if doc.services.is_empty() {
        return Err(Error::Validation("lock contains no services".into()));
    }

    let m = &doc.metadata;
    if m.generator_id.trim().is_empty() {
        return Err(Error::Validation("metadata.generator_id is empty".into()));
    }
    if m.source_branch.trim().is_empty() {
        return Err(Error::Validation("metadata.source_branch is empty".into()));
    }
    if !is_full_sha(&m.monorepo_commit_sha) {
        return Err(Error::Validation(format!(
            "metadata.monorepo_commit_sha is not a full 40-hex SHA: '{}'",
            m.monorepo_commit_sha
        )));
    }
    if DateTime::parse_from_rfc3339(&m.generated_at).is_err() {
        return Err(Error::Validation(format!(
            "metadata.generated_at is not an RFC 3339 timestamp: '{}'",
            m.generated_at
        )));
    }

    for (name, svc) in &doc.services {
        if svc.submodule_path.trim().is_empty() {
            return Err(Error::Validation(format!("service '{name}': submodule_path is empty")));
        }
        if !is_full_sha(&svc.git_sha) {
            return Err(Error::Validation(format!(
                "service '{name}': git_sha is not a full 40-hex SHA: '{}'",
                svc.git_sha
            )));
        }
        if svc.image.repository.trim().is_empty() {
            // Covers the digest-without-repository case as well: a digest
            // pin is meaningless without a repository to pull from.
            return Err(Error::Validation(format!("service '{name}': image.repository is empty")));
        }
        if svc.image.tag.trim().is_empty() {
            return Err(Error::Validation(format!("service '{name}': image.tag is empty")));
        }
        if let Some(digest) = &svc.image.digest {
            if !is_oci_digest(digest) {
                return Err(Error::Validation(format!(
                    "service '{name}': image.digest is not an OCI sha256 digest: '{digest}'"
                )));
            }
        }
    }

    Ok(())
}

/// Serialize to the persisted YAML form (spec schema, sorted keys).
pub fn to_yaml(doc: &LockDocument) -> Result<String> {
    serde_yaml::to_string(doc).map_err(|e| Error::Serialize(e.to_string()))
}

/// Parse and validate a persisted lock document.
pub fn from_yaml(s: &str) -> Result<LockDocument> {
    let doc: LockDocument =
        serde_yaml::from_str(s).map_err(|e| Error::Validation(format!("malformed lock: {e}")))?;
    validate_document(&doc)?;
    Ok(doc)
}

#[derive(Serialize)]
struct DigestView<'a> {
    generator_id: &'a str,
    source_branch: &'a str,
    monorepo_commit_sha: &'a str,
    services: &'a BTreeMap<String, ServiceLock>,
}

/// SHA-256 over the canonical JSON of everything except `generated_at`.
/// Two locks with equal digests pin the same service set; the promotion
/// controller uses this for its regeneration check.
pub fn content_digest(doc: &LockDocument) -> String {
    let view = DigestView {
        generator_id: &doc.metadata.generator_id,
        source_branch: &doc.metadata.source_branch,
        monorepo_commit_sha: &doc.metadata.monorepo_commit_sha,
        services: &doc.services,
    };
    // BTreeMap keys are already sorted, so this serialization is canonical.
    let bytes = serde_json::to_vec(&view).expect("lock document serializable");
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
