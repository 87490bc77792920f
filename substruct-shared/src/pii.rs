use serde::{Serialize, Deserialize, Serializer};
use std::fmt;

/// A wrapper for sensitive data (card numbers, customer emails) that masks its value in Debug
/// and Display output. Serialization still yields the real value.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Persistence and gateway calls need the real value; the mask only guards log macros.
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl Masked<String> {
    /// Keep only the last four characters, e.g. `XXXXXXXXXXXX0027`.
    pub fn redact_to_last_four(&self) -> Masked<String> {
        let chars: Vec<char> = self.0.chars().collect();
        let keep = chars.len().saturating_sub(4);
        let redacted: String = chars
            .iter()
            .enumerate()
            .map(|(i, c)| if i < keep { 'X' } else { *c })
            .collect();
        Masked(redacted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_is_masked() {
        let card = Masked("4007000000027".to_string());
        assert_eq!(format!("{:?}", card), "********");
        assert_eq!(format!("{}", card), "********");
        assert_eq!(serde_json::to_string(&card).unwrap(), "\"4007000000027\"");
    }

    #[test]
    fn test_redact_to_last_four() {
        let card = Masked("4007000000027".to_string());
        assert_eq!(card.redact_to_last_four().expose(), "XXXXXXXXX0027");

        let short = Masked("12".to_string());
        assert_eq!(short.redact_to_last_four().expose(), "12");
    }
}
