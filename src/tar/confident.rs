//! Ordered-confidence field merge (spec §3, Logical Entry assembly).
//!
//! Several header variants can all supply the same logical field (name,
//! size, ownership, ...); `ConfidentValue` keeps whichever value arrived
//! with the highest confidence, so a pax `path` record always wins over a
//! ustar `prefix`+`name` split, which in turn wins over the bare V7 `name`.
//! Lifted nearly verbatim from the teacher's `confident_value` module.

/// Source confidence, from least to most authoritative. `Ord` derive gives
/// the ranking the parser needs directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    V7,
    Ustar,
    OldGnu,
    Gnu,
    Star,
    LongNameEscape,
    PaxGlobal,
    PaxLocal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfidentValue<T> {
    value: Option<(Confidence, T)>,
}

impl<T> ConfidentValue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { value: None }
    }

    fn has_superior_confidence(&self, new_confidence: Confidence) -> bool {
        self.value
            .as_ref()
            .is_some_and(|(current, _)| *current > new_confidence)
    }

    pub fn set(&mut self, confidence: Confidence, value: T) {
        if !self.has_superior_confidence(confidence) {
            self.value = Some((confidence, value));
        }
    }

    /// Unconditionally replaces the stored value, bypassing the confidence
    /// check. Used when parsing explicitly supersedes an earlier guess
    /// (e.g. a pax override list applied after the merge).
    pub fn force_set(&mut self, confidence: Confidence, value: T) {
        self.value = Some((confidence, value));
    }

    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref().map(|(_, v)| v)
    }

    #[must_use]
    pub fn confidence(&self) -> Option<Confidence> {
        self.value.as_ref().map(|(c, _)| *c)
    }

    pub fn into_value(self) -> Option<T> {
        self.value.map(|(_, v)| v)
    }

    pub fn get_or_set_with<F>(&mut self, new_confidence: Confidence, f: F) -> Option<&T>
    where
        F: FnOnce() -> Option<T>,
    {
        if !self.has_superior_confidence(new_confidence) {
            if let Some(parsed) = f() {
                self.value = Some((new_confidence, parsed));
            }
        }
        self.get()
    }
}

impl<T> Default for ConfidentValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_confidence_wins_regardless_of_order() {
        let mut name = ConfidentValue::new();
        name.set(Confidence::PaxLocal, "pax-name".to_string());
        name.set(Confidence::V7, "v7-name".to_string());
        assert_eq!(name.get().unwrap(), "pax-name");
    }

    #[test]
    fn later_equal_confidence_does_not_override() {
        let mut v = ConfidentValue::new();
        v.set(Confidence::Ustar, 1u32);
        v.set(Confidence::Ustar, 2u32);
        assert_eq!(*v.get().unwrap(), 1);
    }

    #[test]
    fn force_set_bypasses_confidence() {
        let mut v = ConfidentValue::new();
        v.set(Confidence::PaxLocal, 1u32);
        v.force_set(Confidence::V7, 2u32);
        assert_eq!(*v.get().unwrap(), 2);
    }
}
