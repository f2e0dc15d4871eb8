//! The mutation engine: categorical tags, the operator trait, the filter
//! expression, and the order-stable operator catalog.

mod ops;

use std::fmt::Write as _;

use bitflags::bitflags;
use derive_new::new as New;

use crate::dictionary::Dictionary;
use crate::rng::RandSource;

bitflags! {
    /// Categorical tags attached to every operator, used by `--mutators`
    /// to enable subsets of the catalog.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MutationTags: u16 {
        const BYTE = 1 << 0;
        const BIT = 1 << 1;
        const SHORT = 1 << 2;
        const LONG = 1 << 3;
        const LONGLONG = 1 << 4;
        const ASCII = 1 << 5;
        const DICTIONARY = 1 << 6;
        const TEXT = 1 << 7;
        const ADDSUB = 1 << 8;
        const REPLACE = 1 << 9;
        const INSERT = 1 << 10;
        const REMOVE = 1 << 11;
        const DUPLICATE = 1 << 12;
        const COPY = 1 << 13;
        const SWAP = 1 << 14;
        const APPEND = 1 << 15;
    }
}

const TAG_TOKENS: &[(&str, MutationTags)] = &[
    ("byte", MutationTags::BYTE),
    ("bit", MutationTags::BIT),
    ("short", MutationTags::SHORT),
    ("long", MutationTags::LONG),
    ("longlong", MutationTags::LONGLONG),
    ("ascii", MutationTags::ASCII),
    ("dictionary", MutationTags::DICTIONARY),
    ("text", MutationTags::TEXT),
    ("addsub", MutationTags::ADDSUB),
    ("replace", MutationTags::REPLACE),
    ("insert", MutationTags::INSERT),
    ("remove", MutationTags::REMOVE),
    ("duplicate", MutationTags::DUPLICATE),
    ("copy", MutationTags::COPY),
    ("swap", MutationTags::SWAP),
    ("append", MutationTags::APPEND),
];

impl MutationTags {
    fn from_token(token: &str) -> Option<Self> {
        TAG_TOKENS
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, tag)| *tag)
    }

    /// The token names of the set tags, in catalog order.
    pub fn token_names(self) -> Vec<&'static str> {
        TAG_TOKENS
            .iter()
            .filter(|(_, tag)| self.contains(*tag))
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Outcome of one operator application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationResult {
    Mutated,
    /// The operator's precondition failed; the buffer was left untouched.
    Skipped,
}

/// Everything an operator may draw on besides the input itself.
#[derive(New)]
pub struct MutationCtx<'a> {
    pub rand: &'a mut dyn RandSource,
    pub dict: &'a Dictionary,
}

impl std::fmt::Debug for MutationCtx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCtx")
            .field("dict", &self.dict)
            .finish_non_exhaustive()
    }
}

/// A single byte-level transformation.
///
/// Operators check their length precondition first and return
/// [`MutationResult::Skipped`] without touching the buffer when it fails.
/// They never enforce a maximum length; the corpus truncates afterwards.
pub trait Mutator: Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn tags(&self) -> MutationTags;

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult;
}

/// Every operator the engine knows, in registration order.
///
/// Enumeration order is stable so that a seeded run maps the same draw to
/// the same operator.
pub static CATALOG: &[&dyn Mutator] = &[
    &ops::RemoveRange,
    &ops::InsertBytes,
    &ops::DuplicateRange,
    &ops::CopyRange,
    &ops::BitFlip,
    &ops::RandomiseByte,
    &ops::SwapBytes,
    &ops::AddSubByte,
    &ops::AddSubShort,
    &ops::AddSubLong,
    &ops::AddSubLongLong,
    &ops::ReplaceInterestingByte,
    &ops::ReplaceInterestingShort,
    &ops::ReplaceInterestingLong,
    &ops::ReplaceAsciiDigit,
    &ops::DictionaryInsert,
    &ops::DictionaryAppend,
];

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("unknown mutation tag `{0}`")]
    UnknownTag(String),
    #[error("no mutation operators match the filter `{0}`")]
    EmptySelection(String),
}

/// Select the active operators for a whitespace separated tag expression.
///
/// Each token names a tag the operator must carry; a leading `!` rejects
/// operators carrying the tag instead. `None` admits the whole catalog.
pub fn select(filter: Option<&str>) -> Result<Vec<&'static dyn Mutator>, FilterError> {
    let Some(expr) = filter else {
        return Ok(CATALOG.to_vec());
    };
    let mut required = MutationTags::empty();
    let mut rejected = MutationTags::empty();
    for token in expr.split_whitespace() {
        if let Some(negated) = token.strip_prefix('!') {
            rejected |= MutationTags::from_token(negated)
                .ok_or_else(|| FilterError::UnknownTag(negated.to_owned()))?;
        } else {
            required |= MutationTags::from_token(token)
                .ok_or_else(|| FilterError::UnknownTag(token.to_owned()))?;
        }
    }
    let selected: Vec<_> = CATALOG
        .iter()
        .copied()
        .filter(|m| m.tags().contains(required) && (m.tags() & rejected).is_empty())
        .collect();
    if selected.is_empty() {
        return Err(FilterError::EmptySelection(expr.to_owned()));
    }
    Ok(selected)
}

/// Render the catalog for `--list-mutators`, marking operators the current
/// filter disables with a leading `-`.
pub fn catalog_listing(filter: Option<&str>) -> Result<String, FilterError> {
    let active = select(filter)?;
    let mut out = String::from("Mutators currently available (and their types):\n");
    for mutator in CATALOG {
        let enabled = active.iter().any(|m| m.name() == mutator.name());
        let indicator = if enabled { ' ' } else { '-' };
        writeln!(
            out,
            "  {indicator}{:<60} [{}]",
            mutator.name(),
            mutator.tags().token_names().join(", ")
        )
        .expect("writing to a String cannot fail");
    }
    out.push_str("\nMutators prefixed by '-' are currently disabled.\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_filter_admits_the_whole_catalog() {
        assert_eq!(select(None).unwrap().len(), CATALOG.len());
    }

    #[test]
    fn blank_filter_admits_the_whole_catalog() {
        assert_eq!(select(Some("")).unwrap().len(), CATALOG.len());
    }

    #[test]
    fn required_tags_are_conjunctive() {
        let selected = select(Some("byte replace")).unwrap();
        assert!(!selected.is_empty());
        for m in &selected {
            assert!(m.tags().contains(MutationTags::BYTE | MutationTags::REPLACE));
        }
    }

    #[test]
    fn negated_tags_reject() {
        let selected = select(Some("!dictionary")).unwrap();
        assert_eq!(selected.len(), CATALOG.len() - 2);
        for m in &selected {
            assert!(!m.tags().contains(MutationTags::DICTIONARY));
        }
    }

    #[test]
    fn contradictory_filter_is_an_error() {
        let err = select(Some("byte !byte")).unwrap_err();
        assert!(matches!(err, FilterError::EmptySelection(_)));
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let err = select(Some("bytes")).unwrap_err();
        assert!(matches!(err, FilterError::UnknownTag(t) if t == "bytes"));
    }

    #[test]
    fn catalog_order_is_stable() {
        let names: Vec<_> = CATALOG.iter().map(|m| m.name()).collect();
        assert_eq!(names[0], "remove a range of bytes");
        assert_eq!(names[4], "flip a bit");
        assert_eq!(names[16], "append a dictionary word");
    }

    #[test]
    fn listing_marks_disabled_operators() {
        let listing = catalog_listing(Some("!dictionary")).unwrap();
        assert!(listing.contains("  -insert a dictionary word"));
        assert!(listing.contains("   remove a range of bytes"));
    }
}
