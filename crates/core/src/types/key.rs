//! Newtype keys for the values that make up an idempotency key.
//!
//! Use the `define_key!` macro to create string wrappers that prevent
//! accidentally passing a field key where a resource GID is expected.

use sha2::{Digest, Sha256};

/// Macro to define a string key wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<&str>`, `From<String>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use bulkops_core::define_key;
/// define_key!(SkuKey);
///
/// let sku = SkuKey::new("NP-001");
/// assert_eq!(sku.as_str(), "NP-001");
/// ```
#[macro_export]
macro_rules! define_key {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Default,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new key from anything string-like.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the key and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the key is the empty string.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Shopify global ID of the target entity (e.g. `gid://shopify/Product/123`).
define_key!(ResourceKey);
// Translatable field key (`title`, `body_html`, `meta_title`, ...).
define_key!(FieldKey);
// Locale or variant tag the mutation applies to. Empty for non-translation jobs.
define_key!(Locale);
// Shopify-supplied content digest identifying the source revision of a field.
define_key!(ContentDigest);
// Lowercase hex SHA-256 of a submitted value.
define_key!(ValueHash);

impl ValueHash {
    /// Hash a submitted value (UTF-8 bytes, SHA-256, lowercase hex).
    #[must_use]
    pub fn of(value: &str) -> Self {
        Self(hex::encode(Sha256::digest(value.as_bytes())))
    }
}
