//! Content fingerprints used as cache keys.
//!
//! A [`Fingerprint`] is a blake3 digest over a canonical byte encoding of
//! whatever identifies a computation: primitive name plus hyperparameters
//! plus input digests for step-level caching, or a complete configuration
//! point for candidate-level caching. Equal fingerprints must correspond to
//! semantically equal computations.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

/// A deterministic 256-bit content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Digest a single byte slice.
    pub fn digest(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Full lowercase hex form.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in &self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// Abbreviated hex form for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Incremental fingerprint construction over heterogeneous parts.
///
/// Each part is length-prefixed so that concatenation ambiguity cannot
/// produce colliding encodings.
pub struct FingerprintBuilder {
    hasher: blake3::Hasher,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.update(s.as_bytes())
    }

    /// NaN payloads are normalized to a single bit pattern so that equal
    /// data always digests equally.
    pub fn update_f64(&mut self, v: f64) -> &mut Self {
        let bits = if v.is_nan() {
            f64::NAN.to_bits()
        } else {
            v.to_bits()
        };
        self.hasher.update(&bits.to_le_bytes());
        self
    }

    pub fn update_fingerprint(&mut self, fp: &Fingerprint) -> &mut Self {
        self.hasher.update(&fp.0);
        self
    }

    pub fn finish(&self) -> Fingerprint {
        Fingerprint(*self.hasher.finalize().as_bytes())
    }
}

impl Default for FingerprintBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a JSON value in canonical form: object keys sorted, no
/// whitespace. Used wherever hyperparameters feed a fingerprint.
pub fn canonical_json(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => serde_json::to_string(s).unwrap_or_default(),
        JsonValue::Array(arr) => {
            let items: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        JsonValue::Object(map) => {
            let mut tree = BTreeMap::new();
            for (k, v) in map {
                tree.insert(k, canonical_json(v));
            }
            let items: Vec<String> = tree
                .into_iter()
                .map(|(k, v)| {
                    format!("{}:{}", serde_json::to_string(&k).unwrap_or_default(), v)
                })
                .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

/// Canonical rendering of a named hyperparameter assignment.
pub fn canonical_params(params: &BTreeMap<String, JsonValue>) -> String {
    let items: Vec<String> = params
        .iter()
        .map(|(k, v)| {
            format!(
                "{}:{}",
                serde_json::to_string(k).unwrap_or_default(),
                canonical_json(v)
            )
        })
        .collect();
    format!("{{{}}}", items.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_object_keys() {
        let a = json!({"k": 5, "alpha": 1.0});
        let b = json!({"alpha": 1.0, "k": 5});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"alpha":1.0,"k":5}"#);
    }

    #[test]
    fn fingerprint_is_stable() {
        let a = Fingerprint::digest(b"model.knn");
        let b = Fingerprint::digest(b"model.knn");
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn fingerprint_differs_on_content() {
        let a = Fingerprint::digest(b"model.knn");
        let b = Fingerprint::digest(b"model.ridge");
        assert_ne!(a, b);
    }

    #[test]
    fn builder_length_prefix_disambiguates() {
        let a = FingerprintBuilder::new()
            .update_str("ab")
            .update_str("c")
            .finish();
        let b = FingerprintBuilder::new()
            .update_str("a")
            .update_str("bc")
            .finish();
        assert_ne!(a, b);
    }

    #[test]
    fn nan_digests_consistently() {
        let a = FingerprintBuilder::new().update_f64(f64::NAN).finish();
        let b = FingerprintBuilder::new().update_f64(0.0 / 0.0).finish();
        assert_eq!(a, b);
    }
}
