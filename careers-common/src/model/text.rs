use serde::Serialize;
use thiserror::Error;

pub const USERNAME_MAX_LEN: usize = 150;
pub const TITLE_MAX_LEN: usize = 255;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidTextError {
    #[error("This field may not be blank.")]
    Blank,
    #[error("Ensure this field has no more than {max_len} characters.")]
    TooLong { max_len: usize },
}

fn check(text: &str, max_len: Option<usize>) -> Result<(), InvalidTextError> {
    if text.trim().is_empty() {
        return Err(InvalidTextError::Blank);
    }
    match max_len {
        Some(max_len) if text.chars().count() > max_len => {
            Err(InvalidTextError::TooLong { max_len })
        }
        _ => Ok(()),
    }
}

macro_rules! text_field {
    ($(#[$meta:meta])* $name:ident, max_len = $max_len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const MAX_LEN: Option<usize> = $max_len;

            pub fn new(text: String) -> Result<Self, InvalidTextError> {
                check(&text, Self::MAX_LEN)?;
                Ok(Self(text))
            }

            #[must_use]
            pub fn get(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

text_field!(
    /// Free-text author name shared by posts and comments.
    Username,
    max_len = Some(USERNAME_MAX_LEN)
);
text_field!(Title, max_len = Some(TITLE_MAX_LEN));
text_field!(
    /// Body text of a post or a comment. Unbounded, but never blank.
    Content,
    max_len = None
);

#[cfg(test)]
mod tests {
    use crate::model::text::{Content, InvalidTextError, Title, Username};

    #[test]
    fn length_is_counted_in_characters() {
        assert!(Username::new("é".repeat(150)).is_ok());
        assert_eq!(
            Username::new("a".repeat(151)),
            Err(InvalidTextError::TooLong { max_len: 150 })
        );
        assert!(Title::new("t".repeat(255)).is_ok());
        assert_eq!(
            Title::new("t".repeat(256)),
            Err(InvalidTextError::TooLong { max_len: 255 })
        );
        assert!(Content::new("c".repeat(100_000)).is_ok());
    }

    #[test]
    fn blank_is_rejected() {
        assert_eq!(Username::new(String::new()), Err(InvalidTextError::Blank));
        assert_eq!(Content::new(" \n\t".into()), Err(InvalidTextError::Blank));
    }

    #[test]
    fn messages() {
        assert_eq!(
            InvalidTextError::TooLong { max_len: 150 }.to_string(),
            "Ensure this field has no more than 150 characters."
        );
        assert_eq!(
            InvalidTextError::Blank.to_string(),
            "This field may not be blank."
        );
    }
}
