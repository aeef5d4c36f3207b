//! Semantic analysis.
//!
//! The checker walks the syntax tree once, maintaining the scope stack, and
//! drives IR generation as it goes: every compound statement is handed to
//! the [`Builder`] just before its scope is popped, so translation sees
//! exactly the names the statement saw. Checking stops at the first error.
pub mod error;
mod symbol_table;
mod types;

use std::rc::Rc;

use log::debug;

use crate::il::{Builder, IrProgram};
use crate::parser::syntax_tree::{
    Block, Expr, ExprKind, ExtDef, FieldDef, ParamDec, Program, Stmt, TypeSpec,
};

pub use error::{SemanticError, SemanticErrorKind};
pub use symbol_table::{AlreadyDefined, FunctionSig, Symbol, SymbolTable};
pub use types::{Field, Ty};

/// Check the program and translate it to IR.
pub fn analyse(program: &Program) -> Result<IrProgram, SemanticError> {
    let mut analyser = Analyser::new();
    analyser.check_program(program)?;
    Ok(analyser.builder.finish())
}

struct Analyser {
    table: SymbolTable,
    builder: Builder,
}
impl Analyser {
    fn new() -> Self {
        Self {
            table: SymbolTable::new(),
            builder: Builder::new(),
        }
    }

    fn check_program(&mut self, program: &Program) -> Result<(), SemanticError> {
        for def in &program.defs {
            match def {
                ExtDef::GlobalVars { line, .. } => {
                    return Err(err(SemanticErrorKind::GlobalVariable, *line));
                }
                ExtDef::TypeDef { spec, line } => {
                    self.resolve_spec(spec, *line)?;
                }
                ExtDef::Function {
                    spec,
                    name,
                    params,
                    body,
                    line,
                } => self.check_function(spec, name, params, body, *line)?,
            }
        }
        Ok(())
    }

    fn check_function(
        &mut self,
        spec: &TypeSpec,
        name: &str,
        params: &[ParamDec],
        body: &Block,
        line: u32,
    ) -> Result<(), SemanticError> {
        debug!("checking function '{}'", name);
        let returns = self.resolve_spec(spec, line)?;

        // read and write are reserved for the runtime.
        if name == "read" || name == "write" {
            return Err(err(
                SemanticErrorKind::RedefinedFunction(name.to_string()),
                line,
            ));
        }
        let mut param_tys = vec![];
        for param in params {
            let base = self.resolve_spec(&param.spec, param.dec.line)?;
            param_tys.push(wrap_dims(base, &param.dec.dims));
        }
        // Declared before the body is checked, so recursive calls resolve.
        self.table
            .declare_function(
                name,
                FunctionSig {
                    returns: returns.clone(),
                    params: param_tys.clone(),
                },
            )
            .map_err(|_| {
                err(
                    SemanticErrorKind::RedefinedFunction(name.to_string()),
                    line,
                )
            })?;

        self.table.push_scope();
        let mut symbols = vec![];
        for (param, ty) in params.iter().zip(param_tys) {
            let by_ref = !ty.is_scalar();
            let symbol = self
                .table
                .declare(&param.dec.name, ty, by_ref)
                .map_err(|_| {
                    err(
                        SemanticErrorKind::RedefinedVariable(param.dec.name.clone()),
                        param.dec.line,
                    )
                })?;
            symbols.push(symbol);
        }
        self.check_block(body, &returns)?;
        self.table.pop_scope();

        self.builder.end_function(name, &symbols);
        Ok(())
    }

    /// Check a compound statement's definitions and statements, then queue
    /// its translation. The caller manages the surrounding scope.
    fn check_block(&mut self, block: &Block, returns: &Rc<Ty>) -> Result<(), SemanticError> {
        for def in &block.defs {
            let base = self.resolve_spec(&def.spec, def.line)?;
            for dec in &def.decs {
                let ty = wrap_dims(base.clone(), &dec.dims);
                let scalar = ty.is_scalar();
                // Declared before its initialiser is checked, so the name
                // resolves the same way here and during translation.
                self.table.declare(&dec.name, ty.clone(), false).map_err(|_| {
                    err(
                        SemanticErrorKind::RedefinedVariable(dec.name.clone()),
                        dec.line,
                    )
                })?;
                if let Some(init) = &dec.init {
                    if !scalar {
                        return Err(err(SemanticErrorKind::AggregateInitialiser, dec.line));
                    }
                    let init_ty = self.check_expr(init)?;
                    if !init_ty.equivalent(&ty) {
                        return Err(err(
                            SemanticErrorKind::AssignmentType(
                                ty.to_string(),
                                init_ty.to_string(),
                            ),
                            dec.line,
                        ));
                    }
                }
            }
        }
        for stmt in &block.stmts {
            self.check_stmt(stmt, returns)?;
        }
        self.builder.translate_block(block, &self.table);
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &Stmt, returns: &Rc<Ty>) -> Result<(), SemanticError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.check_expr(expr)?;
            }
            Stmt::Block(block) => {
                self.table.push_scope();
                self.check_block(block, returns)?;
                self.table.pop_scope();
            }
            Stmt::Return { value, line } => {
                let ty = self.check_expr(value)?;
                if !ty.equivalent(returns) {
                    return Err(err(
                        SemanticErrorKind::ReturnType(returns.to_string()),
                        *line,
                    ));
                }
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                self.check_cond(cond)?;
                self.check_stmt(then, returns)?;
                if let Some(otherwise) = otherwise {
                    self.check_stmt(otherwise, returns)?;
                }
            }
            Stmt::While { cond, body } => {
                self.check_cond(cond)?;
                self.check_stmt(body, returns)?;
            }
        }
        Ok(())
    }

    fn check_cond(&mut self, cond: &Expr) -> Result<(), SemanticError> {
        if !self.check_expr(cond)?.is_scalar() {
            return Err(err(SemanticErrorKind::ConditionType, cond.line));
        }
        Ok(())
    }

    fn check_expr(&mut self, expr: &Expr) -> Result<Rc<Ty>, SemanticError> {
        match &expr.kind {
            ExprKind::Literal(_) => Ok(Ty::int()),
            ExprKind::Identifier(name) => match self.table.lookup(name) {
                Some(symbol) => Ok(symbol.ty.clone()),
                None => Err(err(
                    SemanticErrorKind::UndefinedVariable(name.clone()),
                    expr.line,
                )),
            },
            ExprKind::Assign(lhs, rhs) => {
                if !matches!(
                    lhs.kind,
                    ExprKind::Identifier(_) | ExprKind::Index { .. } | ExprKind::Member { .. }
                ) {
                    return Err(err(SemanticErrorKind::AssignToExpression, expr.line));
                }
                let lhs_ty = self.check_expr(lhs)?;
                let rhs_ty = self.check_expr(rhs)?;
                if !lhs_ty.is_scalar() {
                    return Err(err(SemanticErrorKind::AggregateAssignment, expr.line));
                }
                if !rhs_ty.equivalent(&lhs_ty) {
                    return Err(err(
                        SemanticErrorKind::AssignmentType(
                            lhs_ty.to_string(),
                            rhs_ty.to_string(),
                        ),
                        expr.line,
                    ));
                }
                Ok(lhs_ty)
            }
            ExprKind::Binary(_, lhs, rhs)
            | ExprKind::Compare(_, lhs, rhs)
            | ExprKind::And(lhs, rhs)
            | ExprKind::Or(lhs, rhs) => {
                self.check_int_operand(lhs)?;
                self.check_int_operand(rhs)?;
                Ok(Ty::int())
            }
            ExprKind::Not(operand) | ExprKind::Negate(operand) => {
                self.check_int_operand(operand)?;
                Ok(Ty::int())
            }
            ExprKind::Call { name, args } => self.check_call(name, args, expr.line),
            ExprKind::Index { base, index } => {
                let base_ty = self.check_expr(base)?;
                let elem = match &*base_ty {
                    Ty::Array { elem, .. } => elem.clone(),
                    _ => {
                        return Err(err(
                            SemanticErrorKind::NotAnArray(base_ty.to_string()),
                            expr.line,
                        ))
                    }
                };
                if !self.check_expr(index)?.is_scalar() {
                    return Err(err(SemanticErrorKind::NonIntegerIndex, index.line));
                }
                Ok(elem)
            }
            ExprKind::Member { base, field } => {
                let base_ty = self.check_expr(base)?;
                let (name, looked_up) = match &*base_ty {
                    Ty::Struct { name, .. } => (
                        name.clone().unwrap_or_else(|| "<anonymous>".to_string()),
                        base_ty.field(field),
                    ),
                    _ => {
                        return Err(err(
                            SemanticErrorKind::NotAStruct(base_ty.to_string()),
                            expr.line,
                        ))
                    }
                };
                match looked_up {
                    Some(f) => Ok(f.ty.clone()),
                    None => Err(err(
                        SemanticErrorKind::UnknownField(name, field.clone()),
                        expr.line,
                    )),
                }
            }
        }
    }

    fn check_int_operand(&mut self, operand: &Expr) -> Result<(), SemanticError> {
        let ty = self.check_expr(operand)?;
        if !ty.is_scalar() {
            return Err(err(
                SemanticErrorKind::OperandType(ty.to_string()),
                operand.line,
            ));
        }
        Ok(())
    }

    fn check_call(
        &mut self,
        name: &str,
        args: &[Expr],
        line: u32,
    ) -> Result<Rc<Ty>, SemanticError> {
        // The runtime builtins are not in the function table.
        let expected: Vec<Rc<Ty>> = match name {
            "read" => vec![],
            "write" => vec![Ty::int()],
            _ => {
                let sig = match self.table.function(name) {
                    Some(sig) => sig.clone(),
                    None if self.table.lookup(name).is_some() => {
                        return Err(err(
                            SemanticErrorKind::NotAFunction(name.to_string()),
                            line,
                        ))
                    }
                    None => {
                        return Err(err(
                            SemanticErrorKind::UndefinedFunction(name.to_string()),
                            line,
                        ))
                    }
                };
                if args.len() != sig.params.len() {
                    return Err(err(
                        SemanticErrorKind::WrongArgumentCount {
                            expected: sig.params.len(),
                            found: args.len(),
                        },
                        line,
                    ));
                }
                for (index, (arg, param)) in args.iter().zip(&sig.params).enumerate() {
                    if !self.check_expr(arg)?.equivalent(param) {
                        return Err(err(SemanticErrorKind::ArgumentType(index + 1), arg.line));
                    }
                }
                return Ok(sig.returns.clone());
            }
        };
        if args.len() != expected.len() {
            return Err(err(
                SemanticErrorKind::WrongArgumentCount {
                    expected: expected.len(),
                    found: args.len(),
                },
                line,
            ));
        }
        for (index, (arg, param)) in args.iter().zip(&expected).enumerate() {
            if !self.check_expr(arg)?.equivalent(param) {
                return Err(err(SemanticErrorKind::ArgumentType(index + 1), arg.line));
            }
        }
        Ok(Ty::int())
    }

    /// Resolve a type specifier, registering any struct it defines.
    fn resolve_spec(&mut self, spec: &TypeSpec, line: u32) -> Result<Rc<Ty>, SemanticError> {
        match spec {
            TypeSpec::Int => Ok(Ty::int()),
            TypeSpec::Struct {
                name,
                fields: Some(fields),
            } => {
                let ty = Rc::new(Ty::Struct {
                    name: name.clone(),
                    fields: self.resolve_fields(fields)?,
                });
                if let Some(name) = name {
                    self.table.declare_struct(name, ty.clone()).map_err(|_| {
                        err(SemanticErrorKind::RedefinedStruct(name.clone()), line)
                    })?;
                }
                Ok(ty)
            }
            TypeSpec::Struct {
                name: Some(name),
                fields: None,
            } => match self.table.structure(name) {
                Some(ty) => Ok(ty.clone()),
                None => Err(err(
                    SemanticErrorKind::UndefinedStruct(name.clone()),
                    line,
                )),
            },
            TypeSpec::Struct {
                name: None,
                fields: None,
            } => unreachable!("the parser requires a struct name or a body"),
        }
    }

    fn resolve_fields(&mut self, defs: &[FieldDef]) -> Result<Vec<Field>, SemanticError> {
        let mut fields: Vec<Field> = vec![];
        let mut offset = 0;
        for def in defs {
            let base = self.resolve_spec(&def.spec, def.line)?;
            for dec in &def.decs {
                if dec.init.is_some() {
                    return Err(err(SemanticErrorKind::FieldInitialiser, dec.line));
                }
                if fields.iter().any(|f| f.name == dec.name) {
                    return Err(err(
                        SemanticErrorKind::RedefinedField(dec.name.clone()),
                        dec.line,
                    ));
                }
                let ty = wrap_dims(base.clone(), &dec.dims);
                let size = ty.size();
                fields.push(Field {
                    name: dec.name.clone(),
                    ty,
                    offset,
                });
                offset += size;
            }
        }
        Ok(fields)
    }
}

/// Apply array dimensions to a base type, outermost dimension first, so
/// `int a[2][3]` becomes an array of 2 arrays of 3 ints.
fn wrap_dims(base: Rc<Ty>, dims: &[u32]) -> Rc<Ty> {
    let mut ty = base;
    for &len in dims.iter().rev() {
        ty = Rc::new(Ty::Array { elem: ty, len });
    }
    ty
}

fn err(kind: SemanticErrorKind, line: u32) -> SemanticError {
    SemanticError::new(kind, line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn analyse_source(source: &str) -> Result<IrProgram, SemanticError> {
        let tokens = lex(source).expect("source should lex");
        let program = parse(&tokens).expect("source should parse");
        analyse(&program)
    }

    macro_rules! assert_accepts {
        ($source:expr) => {
            if let Err(error) = analyse_source($source) {
                panic!("program was rejected: {}", error);
            }
        };
    }

    macro_rules! assert_rejects {
        ($source:expr, $pattern:pat) => {
            match analyse_source($source) {
                Ok(_) => panic!("program was accepted"),
                Err(error) => assert!(
                    matches!(error.kind, $pattern),
                    "unexpected error: {}",
                    error
                ),
            }
        };
    }

    #[test]
    fn accepts_a_complete_program() {
        assert_accepts!(
            "struct Point { int x; int y; };
             int dist(struct Point p) { return p.x + p.y; }
             int main() {
                 struct Point p;
                 int total;
                 p.x = read();
                 p.y = 2;
                 total = 0;
                 while (total < 10) {
                     total = total + dist(p);
                 }
                 write(total);
                 return 0;
             }"
        );
    }

    #[test]
    fn accepts_recursion() {
        assert_accepts!(
            "int fact(int n) {
                 if (n <= 1) return 1;
                 return n * fact(n - 1);
             }
             int main() { return fact(5); }"
        );
    }

    #[test]
    fn rejects_global_variables() {
        assert_rejects!(
            "int g; int main() { return 0; }",
            SemanticErrorKind::GlobalVariable
        );
    }

    #[test]
    fn rejects_undefined_variables() {
        assert_rejects!(
            "int main() { return x; }",
            SemanticErrorKind::UndefinedVariable(_)
        );
    }

    #[test]
    fn rejects_redefinition_in_one_scope_but_allows_shadowing() {
        assert_rejects!(
            "int main() { int x; int x; return 0; }",
            SemanticErrorKind::RedefinedVariable(_)
        );
        assert_accepts!("int main() { int x = 1; { int x = 2; write(x); } return x; }");
    }

    #[test]
    fn rejects_assignment_to_an_expression() {
        assert_rejects!(
            "int main() { int a; (a + 1) = 2; return 0; }",
            SemanticErrorKind::AssignToExpression
        );
    }

    #[test]
    fn rejects_whole_aggregate_assignment() {
        assert_rejects!(
            "int main() { int a[3]; int b[3]; a = b; return 0; }",
            SemanticErrorKind::AggregateAssignment
        );
    }

    #[test]
    fn rejects_aggregate_initialisers() {
        assert_rejects!(
            "int main() { int a[3] = 0; return 0; }",
            SemanticErrorKind::AggregateInitialiser
        );
    }

    #[test]
    fn rejects_arithmetic_on_aggregates() {
        assert_rejects!(
            "int main() { int a[3]; return a + 1; }",
            SemanticErrorKind::OperandType(_)
        );
    }

    #[test]
    fn rejects_indexing_a_scalar() {
        assert_rejects!(
            "int main() { int a; return a[0]; }",
            SemanticErrorKind::NotAnArray(_)
        );
    }

    #[test]
    fn rejects_a_non_integer_index() {
        assert_rejects!(
            "int main() { int a[2][3]; return a[a[0]][1]; }",
            SemanticErrorKind::NonIntegerIndex
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        assert_rejects!(
            "struct P { int x; };
             int main() { struct P p; return p.y; }",
            SemanticErrorKind::UnknownField(..)
        );
    }

    #[test]
    fn rejects_field_access_on_non_structs() {
        assert_rejects!(
            "int main() { int a; return a.x; }",
            SemanticErrorKind::NotAStruct(_)
        );
    }

    #[test]
    fn rejects_call_argument_mismatches() {
        assert_rejects!(
            "int f(int a, int b) { return a + b; }
             int main() { return f(1); }",
            SemanticErrorKind::WrongArgumentCount {
                expected: 2,
                found: 1
            }
        );
        assert_rejects!(
            "int f(int a) { return a; }
             int main() { int x[2]; return f(x); }",
            SemanticErrorKind::ArgumentType(1)
        );
    }

    #[test]
    fn rejects_calling_a_variable() {
        assert_rejects!(
            "int main() { int f; return f(); }",
            SemanticErrorKind::NotAFunction(_)
        );
    }

    #[test]
    fn rejects_redefining_the_builtins() {
        assert_rejects!(
            "int write(int x) { return x; }
             int main() { return 0; }",
            SemanticErrorKind::RedefinedFunction(_)
        );
    }

    #[test]
    fn rejects_return_type_mismatches() {
        assert_rejects!(
            "struct P { int x; };
             int main() { struct P p; return p; }",
            SemanticErrorKind::ReturnType(_)
        );
    }

    #[test]
    fn rejects_non_integer_conditions() {
        assert_rejects!(
            "int main() { int a[2]; while (a) { } return 0; }",
            SemanticErrorKind::ConditionType
        );
    }

    #[test]
    fn checks_array_parameters_by_element_type() {
        // Array lengths are not part of the type.
        assert_accepts!(
            "int sum(int a[10]) { return a[0]; }
             int main() { int b[3]; return sum(b); }"
        );
    }

    #[test]
    fn rejects_duplicate_struct_definitions() {
        assert_rejects!(
            "struct P { int x; };
             struct P { int y; };
             int main() { return 0; }",
            SemanticErrorKind::RedefinedStruct(_)
        );
    }

    #[test]
    fn rejects_struct_field_initialisers() {
        assert_rejects!(
            "struct P { int x = 1; };
             int main() { return 0; }",
            SemanticErrorKind::FieldInitialiser
        );
    }
}
