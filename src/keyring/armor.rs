// keyring/armor.rs - ASCII Armor

use thiserror::Error;

/// Armor label for transferable public keys
pub const PUBLIC_KEY_BLOCK: &str = "DOMAINKEY PUBLIC KEY BLOCK";

/// Armor label for transferable secret keys
pub const SECRET_KEY_BLOCK: &str = "DOMAINKEY PRIVATE KEY BLOCK";

/// Armor label for encrypted messages
pub const MESSAGE: &str = "DOMAINKEY MESSAGE";

const LINE_WIDTH: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArmorError {
    #[error("No armored block found")]
    Missing,

    #[error("Unterminated armored block '{0}'")]
    Unterminated(String),

    #[error("Unexpected armor label '{found}', expected '{expected}'")]
    WrongLabel { expected: String, found: String },

    #[error("Armor body is not valid hex")]
    InvalidBody,
}

/// Wrap bytes in an armored block
pub fn encode(label: &str, payload: &[u8]) -> String {
    let body = hex::encode(payload);
    let mut out = String::with_capacity(body.len() + body.len() / LINE_WIDTH + 80);
    out.push_str(&format!("-----BEGIN {}-----\n\n", label));
    for chunk in body.as_bytes().chunks(LINE_WIDTH) {
        // hex output is ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", label));
    out
}

/// Extract every armored block in `text`, in order
pub fn decode_all(text: &str) -> Result<Vec<(String, Vec<u8>)>, ArmorError> {
    let mut blocks = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let Some(label) = parse_marker(line, "BEGIN") else {
            continue;
        };

        let mut body = String::new();
        let mut closed = false;
        for line in lines.by_ref() {
            if let Some(end) = parse_marker(line, "END") {
                if end != label {
                    return Err(ArmorError::WrongLabel {
                        expected: label,
                        found: end,
                    });
                }
                closed = true;
                break;
            }
            let line = line.trim();
            // Header lines ("Key: value") are allowed and ignored
            if line.contains(':') {
                continue;
            }
            body.push_str(line);
        }

        if !closed {
            return Err(ArmorError::Unterminated(label));
        }
        let payload = hex::decode(&body).map_err(|_| ArmorError::InvalidBody)?;
        blocks.push((label, payload));
    }

    if blocks.is_empty() {
        return Err(ArmorError::Missing);
    }
    Ok(blocks)
}

/// Extract the single block with the expected label
pub fn decode(text: &str, expected: &str) -> Result<Vec<u8>, ArmorError> {
    let (label, payload) = decode_all(text)?
        .into_iter()
        .next()
        .ok_or(ArmorError::Missing)?;
    if label != expected {
        return Err(ArmorError::WrongLabel {
            expected: expected.into(),
            found: label,
        });
    }
    Ok(payload)
}

fn parse_marker(line: &str, kind: &str) -> Option<String> {
    let line = line.trim();
    let inner = line.strip_prefix("-----")?.strip_suffix("-----")?;
    let label = inner.strip_prefix(kind)?.strip_prefix(' ')?;
    Some(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wraps_lines() {
        let armored = encode(MESSAGE, &[0xAB; 100]);
        assert!(armored.starts_with("-----BEGIN DOMAINKEY MESSAGE-----"));
        assert!(armored.trim_end().ends_with("-----END DOMAINKEY MESSAGE-----"));
        assert!(armored.lines().all(|l| l.len() <= LINE_WIDTH || l.starts_with("-----")));
        assert_eq!(decode(&armored, MESSAGE).unwrap(), vec![0xAB; 100]);
    }

    #[test]
    fn test_decode_multiple_blocks_with_noise() {
        let text = format!(
            "some preamble\n{}\nbetween\n{}",
            encode(PUBLIC_KEY_BLOCK, b"one"),
            encode(SECRET_KEY_BLOCK, b"two")
        );
        let blocks = decode_all(&text).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], (PUBLIC_KEY_BLOCK.to_string(), b"one".to_vec()));
        assert_eq!(blocks[1], (SECRET_KEY_BLOCK.to_string(), b"two".to_vec()));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode_all("nothing here"), Err(ArmorError::Missing));
        assert_eq!(
            decode_all("-----BEGIN DOMAINKEY MESSAGE-----\nabcd\n"),
            Err(ArmorError::Unterminated(MESSAGE.into()))
        );
        assert_eq!(
            decode_all("-----BEGIN DOMAINKEY MESSAGE-----\nzz\n-----END DOMAINKEY MESSAGE-----"),
            Err(ArmorError::InvalidBody)
        );
        assert!(matches!(
            decode(&encode(MESSAGE, b"x"), PUBLIC_KEY_BLOCK),
            Err(ArmorError::WrongLabel { .. })
        ));
    }
}
