use crate::codec::DecodeError;

pub const DEFAULT_DELIMITER: char = '@';

/// Splits `user@domain` into its parts.
#[derive(Debug, Clone, Copy)]
pub struct NameParser {
    delimiter: char,
}

impl Default for NameParser {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

impl NameParser {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    /// Returns the bare user and the domain, if one was given. An empty domain
    /// part (`user@`) counts as none.
    pub fn parse(&self, qualified: &str) -> Result<(String, Option<String>), DecodeError> {
        let mut parts = qualified.split(self.delimiter);
        let user = parts.next().unwrap_or_default();
        let domain = parts.next();
        if parts.next().is_some() || user.is_empty() {
            return Err(DecodeError::BadName(qualified.to_string()));
        }

        let domain = domain.filter(|d| !d.is_empty()).map(str::to_string);
        Ok((user.to_string(), domain))
    }

    /// Inverse of [`NameParser::parse`].
    pub fn qualify(&self, user: &str, domain: Option<&str>) -> String {
        match domain {
            Some(domain) => format!("{}{}{}", user, self.delimiter, domain),
            None => user.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let parser = NameParser::default();
        assert_eq!(parser.parse("alice").unwrap(), ("alice".to_string(), None));
        assert_eq!(
            parser.parse("alice@EXAMPLE").unwrap(),
            ("alice".to_string(), Some("EXAMPLE".to_string()))
        );
        assert_eq!(parser.parse("alice@").unwrap(), ("alice".to_string(), None));
    }

    #[test]
    fn test_rejects_bad_names() {
        let parser = NameParser::default();
        for bad in ["", "@EXAMPLE", "a@b@c"] {
            assert!(
                matches!(parser.parse(bad), Err(DecodeError::BadName(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
