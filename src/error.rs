use thiserror::Error;

use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::type_checking::SemanticError;

/// Any failure the compiler can report to the user.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("lexical error: {0}")]
    Lex(#[from] LexError),
    #[error("syntax error: {0}")]
    Parse(#[from] ParseError),
    #[error("semantic error: {0}")]
    Semantic(#[from] SemanticError),
    #[error("cannot access '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn io(path: &str, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    /// The process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Lex(_) | Self::Parse(_) => 1,
            Self::Semantic(_) => 3,
            Self::Io { .. } => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::LexErrorKind;
    use crate::type_checking::SemanticErrorKind;

    #[test]
    fn failure_classes_map_to_their_exit_codes() {
        let lex = CompileError::from(LexError::new(LexErrorKind::UnterminatedComment, 1));
        assert_eq!(lex.exit_code(), 1);

        let semantic =
            CompileError::from(SemanticError::new(SemanticErrorKind::GlobalVariable, 1));
        assert_eq!(semantic.exit_code(), 3);

        let io = CompileError::io(
            "missing.cmm",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(io.exit_code(), 4);
    }
}
