//! Client command line protocol.
//!
//! `PUT <key> <value>`, `GET <key>`, `DELETE <key>` and `SHUTDOWN`. Verbs are
//! case-insensitive and tokens are separated by single spaces.

use std::str::FromStr;

use crate::error::KvError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Put { key: String, value: String },
    Get { key: String },
    Delete { key: String },
    Shutdown,
}

fn invalid(message: &str) -> KvError {
    KvError::InvalidInput(message.to_string())
}

impl FromStr for Command {
    type Err = KvError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.eq_ignore_ascii_case("shutdown") {
            return Ok(Command::Shutdown);
        }

        // Doubled separators leave empty tokens; trailing ones are dropped.
        let mut parts: Vec<&str> = line.split(' ').collect();
        while parts.len() > 1 && parts.last().map_or(false, |p| p.is_empty()) {
            parts.pop();
        }

        match parts[0].to_ascii_lowercase().as_str() {
            "put" => match parts[1..] {
                [key, value] if key.is_empty() || value.is_empty() => Err(invalid(
                    "PUT operation failed due to empty key or value",
                )),
                [key, value] => Ok(Command::Put {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
                _ => Err(invalid("PUT operation failed due to malformed input")),
            },
            "get" => match parts[1..] {
                [key] if key.is_empty() => Err(invalid("GET operation failed due to empty key")),
                [key] => Ok(Command::Get {
                    key: key.to_string(),
                }),
                _ => Err(invalid("GET operation failed due to malformed input")),
            },
            "delete" => match parts[1..] {
                [key] if key.is_empty() => {
                    Err(invalid("DELETE operation failed due to empty key"))
                }
                [key] => Ok(Command::Delete {
                    key: key.to_string(),
                }),
                _ => Err(invalid("DELETE operation failed due to malformed input")),
            },
            _ => Err(invalid("Operation failed due to malformed input")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, KvError> {
        line.parse()
    }

    fn message(line: &str) -> String {
        match parse(line) {
            Err(KvError::InvalidInput(message)) => message,
            other => panic!("expected invalid input for {:?}, got {:?}", line, other),
        }
    }

    #[test]
    fn well_formed_commands() {
        assert_eq!(
            parse("PUT a 1").unwrap(),
            Command::Put {
                key: "a".into(),
                value: "1".into()
            }
        );
        assert_eq!(parse("get a").unwrap(), Command::Get { key: "a".into() });
        assert_eq!(
            parse("Delete a\n").unwrap(),
            Command::Delete { key: "a".into() }
        );
        assert_eq!(parse("shutdown").unwrap(), Command::Shutdown);
        assert_eq!(parse("PUT a 1 ").unwrap(), parse("PUT a 1").unwrap());
    }

    #[test]
    fn wrong_token_count_is_malformed() {
        assert_eq!(message("PUT a"), "PUT operation failed due to malformed input");
        assert_eq!(message("PUT a 1 2"), "PUT operation failed due to malformed input");
        assert_eq!(message("GET"), "GET operation failed due to malformed input");
        assert_eq!(message("DELETE a b"), "DELETE operation failed due to malformed input");
        assert_eq!(message("LIST"), "Operation failed due to malformed input");
        assert_eq!(message(""), "Operation failed due to malformed input");
    }

    #[test]
    fn empty_tokens_are_rejected() {
        assert_eq!(message("PUT  1"), "PUT operation failed due to empty key or value");
        assert_eq!(message("DELETE  "), "DELETE operation failed due to malformed input");
        assert_eq!(message("PUT a  1"), "PUT operation failed due to malformed input");
    }
}
