use std::collections::HashMap;

use crate::{
    error::{Error, Result},
    script::model::{Operation, Verb},
};

/// Longest accepted fragment identifier.
pub const MAX_FRAGMENT_ID_LEN: usize = 128;

/// Admin-seeded named script snippets that agents inline via `Include`.
///
/// Seeded once at startup; there is no runtime registration surface.
/// Fragments may not themselves contain `Include` — no recursion.
#[derive(Debug, Default)]
pub struct FragmentRegistry {
    fragments: HashMap<String, Vec<Operation>>,
}

/// Identifier charset: letters, digits, `-`, `_`, `.`.
pub fn validate_fragment_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_FRAGMENT_ID_LEN {
        return Err(Error::compile(
            "Include",
            format!("fragment id {id:?} must be 1..={MAX_FRAGMENT_ID_LEN} chars"),
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::compile(
            "Include",
            format!("fragment id {id:?} has invalid characters"),
        ));
    }
    Ok(())
}

fn contains_include(op: &Operation) -> bool {
    if op.verb == Verb::Include {
        return true;
    }
    if let Some(spec) = &op.for_each
        && contains_include(&spec.body)
    {
        return true;
    }
    if let Some(spec) = &op.predicate
        && contains_include(&spec.then)
    {
        return true;
    }
    false
}

impl FragmentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fragment. Rejects invalid ids, duplicate ids, and any
    /// fragment containing `Include` anywhere in its body.
    pub fn seed(&mut self, id: &str, operations: Vec<Operation>) -> Result<()> {
        validate_fragment_id(id)?;
        if self.fragments.contains_key(id) {
            return Err(Error::compile(
                "Include",
                format!("fragment {id:?} already registered"),
            ));
        }
        if operations.iter().any(contains_include) {
            return Err(Error::compile(
                "Include",
                format!("fragment {id:?} may not contain Include"),
            ));
        }
        self.fragments.insert(id.to_string(), operations);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&[Operation]> {
        self.fragments
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::compile("Include", format!("unknown fragment {id:?}")))
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.fragments.keys().cloned().collect();
        ids.sort();
        ids
    }
}
