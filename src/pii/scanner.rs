//! Key-driven PII field encryption over JSON documents.
//!
//! Documents are walked with an explicit work list so nesting depth never
//! grows the call stack. A field is encrypted when its name is in the
//! configured set (case-insensitive) or fully matches the configured pattern.
//! Values that already carry the `_enc` marker are left alone, which makes a
//! second pass over migrated output a no-op.
//!
//! Parsing keeps numbers as written, so values the scanner does not touch
//! leave byte for byte. Documents nested deeper than [`MAX_NESTING_DEPTH`]
//! are rejected before parsing, since the parser itself recurses.

use std::borrow::Cow;
use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use zeroize::Zeroize;

use crate::encryption::{EncryptionError, FieldCipher, FieldWrapper, ENC_MARKER};

/// Same default as Jackson's `StreamReadConstraints`
pub const MAX_NESTING_DEPTH: usize = 1000;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Document is not valid JSON: {0}")]
    InvalidDocument(#[source] serde_json::Error),

    #[error("Document nesting exceeds {limit} levels")]
    TooDeep { limit: usize },

    #[error("Invalid PII key pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Malformed encrypted field: {0}")]
    MalformedWrapper(#[source] serde_json::Error),

    #[error("JSON serialization error: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),
}

impl ScanError {
    /// Type and variant name, free of any message text
    pub fn class(&self) -> &'static str {
        match self {
            ScanError::InvalidDocument(_) => "ScanError::InvalidDocument",
            ScanError::TooDeep { .. } => "ScanError::TooDeep",
            ScanError::InvalidPattern(_) => "ScanError::InvalidPattern",
            ScanError::MalformedWrapper(_) => "ScanError::MalformedWrapper",
            ScanError::Serialize(_) => "ScanError::Serialize",
            ScanError::Encryption(_) => "ScanError::Encryption",
        }
    }
}

/// Encrypts configured PII fields of JSON documents in place
#[derive(Debug, Clone)]
pub struct PiiScanner {
    cipher: FieldCipher,
    keys: HashSet<String>,
    pattern: Option<Regex>,
}

impl PiiScanner {
    /// Build a scanner. Blank key names are dropped; `pattern` is matched
    /// case-insensitively against the whole field name.
    pub fn new<I, S>(cipher: FieldCipher, keys: I, pattern: Option<&str>) -> Result<Self, ScanError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let pattern = match pattern.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Some(
                RegexBuilder::new(&format!("^(?:{})$", p))
                    .case_insensitive(true)
                    .build()?,
            ),
            None => None,
        };

        Ok(Self {
            cipher,
            keys,
            pattern,
        })
    }

    pub fn cipher(&self) -> &FieldCipher {
        &self.cipher
    }

    fn matches(&self, field_name: &str) -> bool {
        self.keys.contains(&field_name.to_lowercase())
            || self
                .pattern
                .as_ref()
                .is_some_and(|p| p.is_match(field_name))
    }

    /// Encrypt every qualifying field of `document`, using `document_id` as
    /// associated data. Returns the input slice untouched when nothing
    /// qualified, so callers can tell a no-op apart by `Cow::Borrowed`.
    pub fn encrypt<'a>(&self, document: &'a [u8], document_id: &str) -> Result<Cow<'a, [u8]>, ScanError> {
        if document.iter().all(u8::is_ascii_whitespace) {
            return Ok(Cow::Borrowed(document));
        }

        let mut root = parse_document(document)?;
        let replaced = self.encrypt_tree(&mut root, document_id)?;
        if replaced == 0 {
            return Ok(Cow::Borrowed(document));
        }

        let out = serde_json::to_vec(&root).map_err(ScanError::Serialize)?;
        Ok(Cow::Owned(out))
    }

    fn encrypt_tree(&self, root: &mut Value, document_id: &str) -> Result<usize, ScanError> {
        let mut replaced = 0;
        let mut stack: Vec<&mut Value> = vec![root];

        while let Some(current) = stack.pop() {
            match current {
                Value::Object(fields) => {
                    for (name, value) in fields {
                        if is_field_wrapper(value) {
                            continue;
                        }
                        if self.matches(name) {
                            *value = self.wrap(value, document_id)?;
                            replaced += 1;
                        } else if is_container(value) {
                            stack.push(value);
                        }
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if is_container(item) && !is_field_wrapper(item) {
                            stack.push(item);
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(replaced)
    }

    fn wrap(&self, value: &Value, document_id: &str) -> Result<Value, ScanError> {
        let mut plaintext = serde_json::to_vec(value).map_err(ScanError::Serialize)?;
        let envelope = self.cipher.encrypt(&plaintext, document_id);
        plaintext.zeroize();
        serde_json::to_value(FieldWrapper::new(envelope?)).map_err(ScanError::Serialize)
    }

    /// Replace every field wrapper in `document` with its decrypted value.
    /// Verification only; the migration path never decrypts.
    pub fn decrypt_document(&self, document: &[u8], document_id: &str) -> Result<Vec<u8>, ScanError> {
        let mut root = parse_document(document)?;
        let mut stack: Vec<&mut Value> = vec![&mut root];

        while let Some(current) = stack.pop() {
            if is_field_wrapper(current) {
                let wrapper: FieldWrapper =
                    serde_json::from_value(current.take()).map_err(ScanError::MalformedWrapper)?;
                let plaintext = self.cipher.decrypt(&wrapper.enc, document_id)?;
                *current = parse_document(&plaintext)?;
                continue;
            }
            match current {
                Value::Object(fields) => stack.extend(fields.values_mut().filter(|v| is_container(v))),
                Value::Array(items) => stack.extend(items.iter_mut().filter(|v| is_container(v))),
                _ => {}
            }
        }

        serde_json::to_vec(&root).map_err(ScanError::Serialize)
    }
}

/// Parse with the depth checked up front instead of serde_json's fixed cap
pub fn parse_document(bytes: &[u8]) -> Result<Value, ScanError> {
    if exceeds_depth(bytes, MAX_NESTING_DEPTH) {
        return Err(ScanError::TooDeep {
            limit: MAX_NESTING_DEPTH,
        });
    }
    let mut de = serde_json::Deserializer::from_slice(bytes);
    de.disable_recursion_limit();
    let value = Value::deserialize(&mut de).map_err(ScanError::InvalidDocument)?;
    de.end().map_err(ScanError::InvalidDocument)?;
    Ok(value)
}

/// Bracket depth outside string literals. Malformed input is left for the
/// parser to report.
fn exceeds_depth(bytes: &[u8], limit: usize) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for &b in bytes {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

/// True when `value` is an object carrying the `_enc` marker
pub fn is_field_wrapper(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|fields| fields.contains_key(ENC_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::crypto::tests::test_cipher;
    use crate::encryption::Envelope;

    fn scanner(keys: &[&str], pattern: Option<&str>) -> PiiScanner {
        PiiScanner::new(test_cipher(), keys.iter().copied(), pattern).unwrap()
    }

    fn assert_wrapper_shape(value: &Value) {
        let obj = value.as_object().expect("wrapper must be an object");
        assert_eq!(obj.len(), 2, "wrapper must only contain v and _enc");
        assert_eq!(obj["v"], 1);
        let enc = obj[ENC_MARKER].as_object().expect("_enc must be an object");
        let mut keys: Vec<&str> = enc.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["alg", "ct", "iv", "kid"]);
    }

    fn decrypt_field(scanner: &PiiScanner, wrapper: &Value, doc_id: &str) -> Value {
        let wrapper: FieldWrapper = serde_json::from_value(wrapper.clone()).unwrap();
        let plaintext = scanner.cipher().decrypt(&wrapper.enc, doc_id).unwrap();
        serde_json::from_slice(&plaintext).unwrap()
    }

    #[test]
    fn test_matching_keys_case_insensitive() {
        let scanner = scanner(&["ssn"], None);
        let json = br#"{"SSN": "123-45-6789", "profile": {"city": "NY"}}"#;

        let out = scanner.encrypt(json, "doc-1").unwrap();
        let root: Value = serde_json::from_slice(&out).unwrap();

        assert_wrapper_shape(&root["SSN"]);
        assert_eq!(root["profile"]["city"], "NY");
        assert!(!String::from_utf8_lossy(&out).contains("123-45-6789"));
    }

    #[test]
    fn test_nested_objects_arrays_and_pattern() {
        let scanner = scanner(&["ssn", "email"], Some(".*secret.*"));
        let json = br#"{
            "users": [{
                "name": "alice",
                "SSN": "111-22-3333",
                "contact": {"Email": "a@example.com"},
                "metadata": [
                    {"secretCode": "abc"},
                    {"nested": [{"secretToken": {"k": 1}}]}
                ]
            }],
            "public": {"v": 1}
        }"#;

        let out = scanner.encrypt(json, "doc-2").unwrap();
        let root: Value = serde_json::from_slice(&out).unwrap();

        assert_wrapper_shape(&root["users"][0]["SSN"]);
        assert_wrapper_shape(&root["users"][0]["contact"]["Email"]);
        assert_wrapper_shape(&root["users"][0]["metadata"][0]["secretCode"]);
        assert_wrapper_shape(&root["users"][0]["metadata"][1]["nested"][0]["secretToken"]);
        assert_eq!(root["users"][0]["name"], "alice");
        assert_eq!(root["public"]["v"], 1);
    }

    #[test]
    fn test_pattern_requires_full_match() {
        let scanner = scanner(&[], Some("secret"));
        let json = br#"{"secret": "a", "secretCode": "b"}"#;

        let out = scanner.encrypt(json, "doc-1").unwrap();
        let root: Value = serde_json::from_slice(&out).unwrap();

        assert_wrapper_shape(&root["secret"]);
        assert_eq!(root["secretCode"], "b");
    }

    #[test]
    fn test_already_encrypted_fields_are_skipped() {
        let scanner = scanner(&["ssn"], None);
        let json = br#"{"profile": {
            "ssn": {"_enc": {"alg": "legacy", "kid": "legacy", "iv": "iv", "ct": "ct"}},
            "SSN2": "should-not-match"
        }}"#;

        let out = scanner.encrypt(json, "doc-3").unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        let root: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(root["profile"]["ssn"]["_enc"]["alg"], "legacy");
        assert_eq!(root["profile"]["SSN2"], "should-not-match");
    }

    #[test]
    fn test_second_pass_is_byte_identical() {
        let scanner = scanner(&["ssn", "email"], Some(".*secret.*"));
        let json = br#"{"ssn": "1", "list": [{"email": "x@y"}, {"secretA": [1, 2]}]}"#;

        let first = scanner.encrypt(json, "doc-1").unwrap().into_owned();
        let second = scanner.encrypt(&first, "doc-1").unwrap();

        assert!(matches!(second, Cow::Borrowed(_)));
        assert_eq!(second.as_ref(), first.as_slice());
    }

    #[test]
    fn test_array_elements_not_matched_by_name() {
        let scanner = scanner(&["tags"], None);
        let json = br#"{"items": ["tags", {"tags": 1}]}"#;

        let out = scanner.encrypt(json, "doc-1").unwrap();
        let root: Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(root["items"][0], "tags");
        assert_wrapper_shape(&root["items"][1]["tags"]);
    }

    #[test]
    fn test_no_match_returns_input_unchanged() {
        let scanner = scanner(&["ssn"], None);
        let json = b"{ \"name\" :  \"bob\" }";

        let out = scanner.encrypt(json, "doc-1").unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out.as_ref(), json.as_slice());
    }

    #[test]
    fn test_empty_document_returned_unchanged() {
        let scanner = scanner(&["ssn"], None);
        let out = scanner.encrypt(b"  \n", "doc-1").unwrap();
        assert_eq!(out.as_ref(), b"  \n");
    }

    #[test]
    fn test_invalid_json_is_input_error() {
        let scanner = scanner(&["ssn"], None);
        assert!(matches!(
            scanner.encrypt(b"{not json", "doc-1"),
            Err(ScanError::InvalidDocument(_))
        ));
    }

    fn nested(depth: usize, inner: &str) -> Vec<u8> {
        format!("{}{}{}", r#"{"n":"#.repeat(depth), inner, "}".repeat(depth)).into_bytes()
    }

    #[test]
    fn test_numbers_keep_exact_text() {
        let scanner = scanner(&["ssn"], None);
        let json = br#"{"account":123456789012345678901234567890,"amount":1.50,"ssn":"x"}"#;

        let out = scanner.encrypt(json, "d").unwrap();
        assert!(matches!(out, Cow::Owned(_)));
        let text = String::from_utf8_lossy(&out);
        assert!(
            text.starts_with(r#"{"account":123456789012345678901234567890,"amount":1.50,"ssn":{"#),
            "numbers rewritten: {}",
            text
        );
    }

    #[test]
    fn test_encrypted_number_decrypts_exactly() {
        let scanner = scanner(&["ssn"], None);
        let out = scanner
            .encrypt(br#"{"ssn":98765432109876543210987654321,"fee":0.10}"#, "d")
            .unwrap();

        let restored = scanner.decrypt_document(&out, "d").unwrap();
        assert_eq!(
            String::from_utf8(restored).unwrap(),
            r#"{"ssn":98765432109876543210987654321,"fee":0.10}"#
        );
    }

    #[test]
    fn test_documents_deeper_than_parser_default_are_encrypted() {
        let scanner = scanner(&["ssn"], None);
        let json = nested(200, r#"{"ssn":"x"}"#);

        let out = scanner.encrypt(&json, "doc-1").unwrap();
        let root = parse_document(&out).unwrap();
        let mut current = &root;
        for _ in 0..200 {
            current = &current["n"];
        }
        assert_wrapper_shape(&current["ssn"]);
    }

    #[test]
    fn test_nesting_beyond_limit_rejected() {
        let scanner = scanner(&["ssn"], None);
        let json = nested(MAX_NESTING_DEPTH, r#"{"ssn":"x"}"#);

        assert!(matches!(
            scanner.encrypt(&json, "doc-1"),
            Err(ScanError::TooDeep { limit: MAX_NESTING_DEPTH })
        ));
    }

    #[test]
    fn test_brackets_inside_strings_do_not_count_as_depth() {
        let scanner = scanner(&["ssn"], None);
        let noise = "[{".repeat(MAX_NESTING_DEPTH);
        let json = format!(r#"{{"note":"{}\"[","ssn":"x"}}"#, noise);

        let out = scanner.encrypt(json.as_bytes(), "doc-1").unwrap();
        let root = parse_document(&out).unwrap();
        assert_eq!(root["note"].as_str().unwrap(), format!("{}\"[", noise));
        assert_wrapper_shape(&root["ssn"]);
    }

    #[test]
    fn test_tree_walk_does_not_recurse() {
        let scanner = scanner(&["ssn"], None);
        let depth = 100_000;
        let mut root = serde_json::json!({"ssn": "deep"});
        for _ in 0..depth {
            let mut wrapper = serde_json::Map::new();
            wrapper.insert("n".to_string(), root);
            root = Value::Object(wrapper);
        }

        let replaced = scanner.encrypt_tree(&mut root, "doc-1").unwrap();
        assert_eq!(replaced, 1);

        // serde_json's own drop is recursive; unwind by hand
        let mut stack = vec![root];
        while let Some(mut v) = stack.pop() {
            if let Some(obj) = v.as_object_mut() {
                stack.extend(std::mem::take(obj).into_iter().map(|(_, v)| v));
            }
        }
    }

    #[test]
    fn test_golden_document_round_trips() {
        let scanner = scanner(&["ssn", "email", "phone"], Some(".*secret.*"));
        let json = br#"{
            "tenant": "t1",
            "profile": {
                "name": "Bob",
                "ssn": "999-88-7777",
                "email": "bob@example.com",
                "address": {"city": "NY", "zip": 10001}
            },
            "accounts": [
                {"type": "checking", "phone": "+1-555-0000", "notes": ["a", "b"], "meta": {"secretCode": "abc"}},
                {"type": "savings", "meta": {"secretToken": {"k": 1, "v": true}}}
            ]
        }"#;
        let original: Value = serde_json::from_slice(json).unwrap();

        let out = scanner.encrypt(json, "doc-golden").unwrap();
        let encrypted: Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(encrypted["tenant"], "t1");
        assert_eq!(encrypted["profile"]["address"], original["profile"]["address"]);
        assert_eq!(encrypted["accounts"][0]["notes"], original["accounts"][0]["notes"]);

        for (enc, orig) in [
            (&encrypted["profile"]["ssn"], &original["profile"]["ssn"]),
            (&encrypted["profile"]["email"], &original["profile"]["email"]),
            (&encrypted["accounts"][0]["phone"], &original["accounts"][0]["phone"]),
            (&encrypted["accounts"][0]["meta"]["secretCode"], &original["accounts"][0]["meta"]["secretCode"]),
            (&encrypted["accounts"][1]["meta"]["secretToken"], &original["accounts"][1]["meta"]["secretToken"]),
        ] {
            assert_wrapper_shape(enc);
            assert_eq!(&decrypt_field(&scanner, enc, "doc-golden"), orig);
        }

        let text = String::from_utf8_lossy(&out);
        for pii in ["999-88-7777", "bob@example.com", "+1-555-0000", "\"abc\""] {
            assert!(!text.contains(pii), "output must not contain plaintext: {}", pii);
        }

        let restored: Value = serde_json::from_slice(&scanner.decrypt_document(&out, "doc-golden").unwrap()).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_decrypt_document_with_wrong_id_fails() {
        let scanner = scanner(&["ssn"], None);
        let out = scanner.encrypt(br#"{"ssn": "1"}"#, "doc-1").unwrap();
        assert!(matches!(
            scanner.decrypt_document(&out, "doc-2"),
            Err(ScanError::Encryption(EncryptionError::AuthenticationFailed))
        ));
    }

    #[test]
    fn test_field_wrapper_detection() {
        let wrapper = serde_json::to_value(FieldWrapper::new(Envelope {
            alg: "a".into(),
            kid: "k".into(),
            iv: "i".into(),
            ct: "c".into(),
        }))
        .unwrap();
        assert!(is_field_wrapper(&wrapper));
        assert!(!is_field_wrapper(&serde_json::json!({"enc": 1})));
        assert!(!is_field_wrapper(&serde_json::json!("_enc")));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(matches!(
            PiiScanner::new(test_cipher(), ["ssn"], Some("(unclosed")),
            Err(ScanError::InvalidPattern(_))
        ));
    }
}
