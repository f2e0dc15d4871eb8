//! AFL / libFuzzer style token dictionaries.
//!
//! Two layouts are accepted: a text file with one `[name=]"escaped"` entry
//! per line, and a directory whose regular files each hold one raw token.
//! See <https://llvm.org/docs/LibFuzzer.html#dictionaries> for the file
//! format. Malformed lines are skipped without complaint.

use std::collections::BTreeSet;
use std::path::Path;
use std::{fs, io};

use crate::rng::RandSource;

/// An unordered multiset of byte-string tokens for the dictionary mutators.
///
/// Tokens are deduplicated and kept in sorted order so a seeded run picks
/// the same word for the same draw.
#[derive(Debug, Default)]
pub struct Dictionary {
    tokens: Vec<Vec<u8>>,
}

impl Dictionary {
    /// Load tokens from a dictionary file or from a directory of token files.
    pub fn load(path: &Path) -> io::Result<Self> {
        let tokens = if path.is_dir() {
            read_token_dir(path)?
        } else {
            read_token_file(path)?
        };
        let tokens = tokens.into_iter().filter(|t| !t.is_empty()).collect();
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// A uniformly random token, or `None` when the dictionary is empty.
    pub fn pick(&self, rand: &mut dyn RandSource) -> Option<&[u8]> {
        if self.tokens.is_empty() {
            return None;
        }
        Some(&self.tokens[rand.below(self.tokens.len())])
    }
}

fn read_token_file(path: &Path) -> io::Result<BTreeSet<Vec<u8>>> {
    let text = fs::read_to_string(path)?;
    let mut tokens = BTreeSet::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(token) = parse_entry(line) {
            tokens.insert(token);
        }
    }
    Ok(tokens)
}

fn read_token_dir(path: &Path) -> io::Result<BTreeSet<Vec<u8>>> {
    let mut tokens = BTreeSet::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            tokens.insert(fs::read(entry.path())?);
        }
    }
    Ok(tokens)
}

/// Parse one `[name=]"escaped"` payload line into raw bytes.
fn parse_entry(line: &str) -> Option<Vec<u8>> {
    let rest = line.strip_suffix('"')?;
    let open = rest.find('"')?;
    let payload = &rest[open + 1..];
    if payload.is_empty() {
        return None;
    }
    unescape(payload)
}

/// Decode C escape sequences (`\xHH`, octal, `\n`, `\\`, `\"`, ...) into
/// bytes. Unknown escapes keep the backslash verbatim, matching the lenient
/// decoders the reference dictionaries were written against.
fn unescape(payload: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len());
    let mut bytes = payload.bytes().peekable();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let Some(esc) = bytes.next() else {
            // Trailing lone backslash: malformed.
            return None;
        };
        match esc {
            b'\\' | b'"' | b'\'' => out.push(esc),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'x' => {
                let hi = hex_digit(bytes.next()?)?;
                let lo = hex_digit(bytes.next()?)?;
                out.push(hi << 4 | lo);
            }
            b'0'..=b'7' => {
                let mut value = u32::from(esc - b'0');
                for _ in 0..2 {
                    match bytes.peek() {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            bytes.next();
                        }
                        _ => break,
                    }
                }
                out.push((value % 256) as u8);
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::rng::testing::ScriptedRand;

    fn load_str(contents: &str) -> Dictionary {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), contents).unwrap();
        Dictionary::load(file.path()).unwrap()
    }

    #[test]
    fn parses_named_and_bare_entries() {
        let dict = load_str(
            "# http tokens\n\
             get=\"GET\"\n\
             \"POST\"\n\
             \n\
             header=\"Content-Length: \"\n",
        );
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn decodes_c_escapes() {
        let dict = load_str("\"\\x00\\xFFa\\n\\\\\\\"\"\n");
        assert_eq!(dict.tokens, vec![vec![0x00, 0xff, b'a', b'\n', b'\\', b'"']]);
    }

    #[test]
    fn decodes_octal_escapes() {
        let dict = load_str("\"\\101\\0z\"\n");
        assert_eq!(dict.tokens, vec![vec![b'A', 0x00, b'z']]);
    }

    #[test]
    fn skips_comments_and_malformed_lines() {
        let dict = load_str(
            "# comment\n\
             not a token line\n\
             broken=\"unterminated\n\
             \"\\xZZ\"\n\
             ok=\"fine\"\n",
        );
        assert_eq!(dict.tokens, vec![b"fine".to_vec()]);
    }

    #[test]
    fn deduplicates_tokens() {
        let dict = load_str("a=\"same\"\nb=\"same\"\n\"same\"\n");
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn reload_is_set_equal() {
        let contents = "one=\"1\"\ntwo=\"2\"\nthree=\"\\x33\"\n";
        let first = load_str(contents);
        let second = load_str(contents);
        assert_eq!(first.tokens, second.tokens);
    }

    #[test]
    fn loads_directory_of_token_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"alpha").unwrap();
        fs::write(dir.path().join("b"), [0u8, 1, 2]).unwrap();
        fs::write(dir.path().join("empty"), b"").unwrap();
        let dict = Dictionary::load(dir.path()).unwrap();
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn pick_is_none_on_empty() {
        let dict = Dictionary::default();
        let mut rand = ScriptedRand::default();
        assert!(dict.pick(&mut rand).is_none());
    }

    #[test]
    fn pick_uses_the_scripted_index() {
        let dict = load_str("\"aa\"\n\"bb\"\n\"cc\"\n");
        let mut rand = ScriptedRand::new(&[1]);
        assert_eq!(dict.pick(&mut rand), Some(&b"bb"[..]));
    }
}
