//! Golden vectors for request signing.
//!
//! Each vector pins the `Authorization` signature for a known secret,
//! timestamp, and signed path. Any other client implementing the same
//! scheme must produce the same values.

use apollo_config_sync::signing;

/// A signing input with its expected signature.
#[derive(Debug, Clone)]
pub struct SigningVector {
    pub name: &'static str,
    pub secret: &'static str,
    pub timestamp_millis: i64,
    pub path_and_query: &'static str,
    /// Base64 HMAC-SHA1.
    pub expected: &'static str,
}

/// All signing vectors.
pub fn all_vectors() -> Vec<SigningVector> {
    vec![
        SigningVector {
            name: "structured_namespace_fetch",
            secret: "ab0c0f0326d2413fafe41f87d61d028e",
            timestamp_millis: 1_700_000_000_000,
            path_and_query: "/configs/my-test-config/default/dev.yml",
            expected: "TMpzXm9VvIGYfDYjz0fVqV7seR4=",
        },
        SigningVector {
            name: "long_poll_with_query",
            secret: "secret",
            timestamp_millis: 1_576_478_257_344,
            path_and_query: "/notifications/v2?appId=app&cluster=default",
            expected: "TAZri9uSyd6RaiIeCAcoPmZPDgo=",
        },
        SigningVector {
            name: "fetch_with_client_ip",
            secret: "df23df3f59884980844ff3dada30fa97",
            timestamp_millis: 1_576_478_257_344,
            path_and_query: "/configs/100004458/default/application?ip=10.0.0.1",
            expected: "EoKyziXvKqzHgwx+ijDJwgVTDgE=",
        },
    ]
}

/// Check every vector. Returns `(name, matches)` pairs.
pub fn verify_all_vectors() -> Vec<(&'static str, bool)> {
    all_vectors()
        .into_iter()
        .map(|v| {
            let ok = signing::signature(v.secret, v.timestamp_millis, v.path_and_query)
                .map(|sig| sig == v.expected)
                .unwrap_or(false);
            (v.name, ok)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_match() {
        for (name, ok) in verify_all_vectors() {
            assert!(ok, "signing vector {} failed", name);
        }
    }

    #[test]
    fn test_vector_names_unique() {
        let vectors = all_vectors();
        let mut names: Vec<_> = vectors.iter().map(|v| v.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), vectors.len());
    }
}
