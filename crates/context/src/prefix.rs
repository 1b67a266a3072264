//! Stable prefix hashing and the last-hash cache.
//!
//! The stable prefix is the rules + settings portion of the prompt. Its
//! hash covers the canonical form of both layers plus the model identity,
//! so prompt-cache boundaries follow provider, model, and tokenizer.
//!
//! Layers are canonicalized chunk by chunk, and the rules constraints are
//! hashed as items rather than as rendered text, so a JSON chunk next to
//! other chunks or a constraint block still hashes by content.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use ctxloom_core::{AssembleRequest, ConstraintItem};
use lru::LruCache;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::canonical::{canonical_json, canonicalize, canonicalize_layer};

pub const DEFAULT_PROVIDER: &str = "default-provider";
pub const DEFAULT_MODEL: &str = "default-model";

const MODEL_SEPARATOR: &str = "\n--model--\n";

/// Provider, model, and tokenizer version a prompt is built for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelIdentity {
    pub provider: String,
    pub model: String,
    pub tokenizer_version: String,
}

impl ModelIdentity {
    /// Request values, with blanks replaced by defaults. The tokenizer
    /// version falls back to the active budget profile's.
    pub fn resolve(request: &AssembleRequest, profile_tokenizer_version: &str) -> Self {
        Self {
            provider: non_blank(request.provider.as_deref()).unwrap_or(DEFAULT_PROVIDER).into(),
            model: non_blank(request.model.as_deref()).unwrap_or(DEFAULT_MODEL).into(),
            tokenizer_version: non_blank(request.tokenizer_version.as_deref())
                .unwrap_or(profile_tokenizer_version)
                .into(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Cache key. Excludes the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StablePrefixKey {
    pub project_id: String,
    pub skill_id: String,
    pub identity: ModelIdentity,
}

impl StablePrefixKey {
    pub fn new(request: &AssembleRequest, identity: ModelIdentity) -> Self {
        Self {
            project_id: request.project_id.clone(),
            skill_id: request.skill_id.clone(),
            identity,
        }
    }
}

/// Rules and settings content as it went into the prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StablePrefix {
    /// Rules chunk contents, without the constraint block.
    pub rules_chunks: Vec<String>,
    /// Constraints kept after trimming.
    pub constraints: Vec<ConstraintItem>,
    /// Settings chunk contents, or the cut text when the total budget
    /// truncated the layer.
    pub settings_chunks: Vec<String>,
}

impl StablePrefix {
    /// Canonical JSON payload that the hash is taken over.
    pub fn canonical(&self) -> Value {
        let constraints: Vec<Value> = self
            .constraints
            .iter()
            .map(|item| {
                json!({
                    "id": item.id,
                    "text": item.text,
                    "source": item.source.as_str(),
                    "priority": item.priority,
                    "degradable": item.degradable,
                })
            })
            .collect();

        canonicalize(&json!({
            "rules": {
                "base": canonical_chunks(&self.rules_chunks),
                "constraints": constraints,
            },
            "settings": canonical_chunks(&self.settings_chunks),
        }))
    }
}

fn canonical_chunks(chunks: &[String]) -> Value {
    Value::Array(
        chunks
            .iter()
            .map(String::as_str)
            .map(canonicalize_layer)
            .filter(|chunk| chunk.as_str() != Some(""))
            .collect(),
    )
}

/// SHA-256 hex over the canonical stable prefix and model identity.
pub fn stable_prefix_hash(prefix: &StablePrefix, identity: &ModelIdentity) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&prefix.canonical()).as_bytes());
    hasher.update(MODEL_SEPARATOR.as_bytes());
    hasher.update(identity.provider.as_bytes());
    hasher.update(b"\n");
    hasher.update(identity.model.as_bytes());
    hasher.update(b"\n");
    hasher.update(identity.tokenizer_version.as_bytes());
    hex::encode(hasher.finalize())
}

/// Bounded map of the last hash seen per key, least-recently-used evicted.
pub struct StablePrefixCache {
    entries: Mutex<LruCache<StablePrefixKey, String>>,
}

impl std::fmt::Debug for StablePrefixCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StablePrefixCache")
            .field("len", &self.len())
            .finish()
    }
}

impl StablePrefixCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Store `hash` under `key`; true when it equals the previous hash.
    pub fn observe(&self, key: StablePrefixKey, hash: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let previous = entries.put(key, hash.to_string());
        previous.as_deref() == Some(hash)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
