use thiserror::Error;

/// An error produced by the semantic checker.
#[derive(Debug, Error)]
#[error("line {line}: {kind}")]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub line: u32,
}
impl SemanticError {
    pub fn new(kind: SemanticErrorKind, line: u32) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Error)]
pub enum SemanticErrorKind {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("variable '{0}' is already defined in this scope")]
    RedefinedVariable(String),
    #[error("undefined function '{0}'")]
    UndefinedFunction(String),
    #[error("function '{0}' is already defined")]
    RedefinedFunction(String),
    #[error("undefined struct '{0}'")]
    UndefinedStruct(String),
    #[error("struct '{0}' is already defined")]
    RedefinedStruct(String),
    #[error("field '{0}' is already defined in this struct")]
    RedefinedField(String),
    #[error("struct '{0}' has no field '{1}'")]
    UnknownField(String, String),
    #[error("cannot apply operator to a value of type '{0}'")]
    OperandType(String),
    #[error("cannot assign a value of type '{1}' to a place of type '{0}'")]
    AssignmentType(String, String),
    #[error("the target of an assignment must be a variable, array element or field")]
    AssignToExpression,
    #[error("cannot assign whole arrays or structs")]
    AggregateAssignment,
    #[error("array and struct variables cannot have initialisers")]
    AggregateInitialiser,
    #[error("struct fields cannot have initialisers")]
    FieldInitialiser,
    #[error("cannot index a value of type '{0}'")]
    NotAnArray(String),
    #[error("array index must be of type 'int'")]
    NonIntegerIndex,
    #[error("cannot access a field of a value of type '{0}'")]
    NotAStruct(String),
    #[error("'{0}' is not a function")]
    NotAFunction(String),
    #[error("function expects {expected} arguments, {found} were supplied")]
    WrongArgumentCount { expected: usize, found: usize },
    #[error("argument {0} has the wrong type")]
    ArgumentType(usize),
    #[error("return value does not match the function's return type '{0}'")]
    ReturnType(String),
    #[error("condition must be of type 'int'")]
    ConditionType,
    #[error("global variables are not supported")]
    GlobalVariable,
}
