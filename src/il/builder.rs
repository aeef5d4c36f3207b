//! Translation of checked syntax into linear IR.
//!
//! The semantic checker drives this builder: each compound statement is
//! translated (and queued) the moment its scope is about to be destroyed,
//! so name resolution still sees the live scope; the statement rule that
//! contains the block later pops the queued list into place.

use std::collections::VecDeque;
use std::mem;
use std::rc::Rc;

use log::trace;

use crate::parser::syntax_tree::{BinOp, Block, Expr, ExprKind, Relop, Stmt};
use crate::type_checking::{Symbol, SymbolTable, Ty};

use super::ir::{Instr, Label, Operand};
use super::list::{IrArena, IrList};
use super::IrProgram;

pub struct Builder {
    arena: IrArena,
    program: IrList,
    pending: VecDeque<IrList>,
    temps: u32,
    labels: u32,
}
impl Builder {
    pub fn new() -> Self {
        Self {
            arena: IrArena::new(),
            program: IrList::new(),
            pending: VecDeque::new(),
            temps: 0,
            labels: 0,
        }
    }

    /// Translate a compound statement and push the result onto the
    /// pending-block queue. Must be called while the block's scope is
    /// still live in `table`.
    pub fn translate_block(&mut self, block: &Block, table: &SymbolTable) {
        let nested = count_nested_blocks(&block.stmts);
        assert!(
            self.pending.len() >= nested,
            "pending-block queue holds fewer lists than the block has nested blocks"
        );
        let mut inner = self.pending.split_off(self.pending.len() - nested);

        let mut code = IrList::new();
        for def in &block.defs {
            for dec in &def.decs {
                let symbol = table
                    .lookup(&dec.name)
                    .expect("checked variable is no longer in scope")
                    .clone();
                if !symbol.ty.is_scalar() {
                    let size = symbol.ty.size();
                    self.emit(
                        &mut code,
                        Instr::Dec {
                            var: Operand::MemBlock {
                                id: symbol.id,
                                size,
                            },
                            size,
                        },
                    );
                }
                if let Some(init) = &dec.init {
                    let value = self.new_temp();
                    let init_code = self.translate_exp(init, table, value);
                    code = code.concat(init_code, &mut self.arena);
                    self.emit(
                        &mut code,
                        Instr::Assign {
                            dst: Operand::Variable(symbol.id),
                            src: value,
                        },
                    );
                }
            }
        }

        for stmt in &block.stmts {
            let stmt_code = self.translate_stmt(stmt, table, &mut inner);
            code = code.concat(stmt_code, &mut self.arena);
        }
        assert!(
            inner.is_empty(),
            "pending-block queue is out of balance after a block"
        );

        self.pending.push_back(code);
    }

    /// Finish a function: pop its queued body, prepend the entry marker
    /// and parameter receives, and splice it onto the program.
    pub fn end_function(&mut self, name: &str, params: &[Symbol]) {
        assert_eq!(
            self.pending.len(),
            1,
            "pending-block queue must hold exactly the function body"
        );
        let body = self.pending.pop_front().expect("queue was checked above");

        let mut code = IrList::new();
        self.emit(
            &mut code,
            Instr::Function {
                name: name.to_string(),
                frame_size: 0,
            },
        );
        for param in params {
            self.emit(
                &mut code,
                Instr::Param {
                    var: Operand::Variable(param.id),
                },
            );
        }
        let code = code.concat(body, &mut self.arena);

        trace!("translated function '{}'", name);
        self.program = mem::take(&mut self.program).concat(code, &mut self.arena);
    }

    pub fn finish(self) -> IrProgram {
        assert!(
            self.pending.is_empty(),
            "pending-block queue is not empty at the end of translation"
        );
        IrProgram {
            arena: self.arena,
            code: self.program,
        }
    }

    fn translate_stmt(
        &mut self,
        stmt: &Stmt,
        table: &SymbolTable,
        inner: &mut VecDeque<IrList>,
    ) -> IrList {
        match stmt {
            Stmt::Expr(expr) => self.translate_exp(expr, table, Operand::Null),
            Stmt::Block(_) => inner
                .pop_front()
                .expect("nested block was not queued before its statement"),
            Stmt::Return { value, .. } => {
                let result = self.new_temp();
                let mut code = self.translate_exp(value, table, result);
                self.emit(
                    &mut code,
                    Instr::Return {
                        value: result,
                        function: None,
                    },
                );
                code
            }
            Stmt::If {
                cond,
                then,
                otherwise: None,
            } => {
                let body_lbl = self.new_label();
                let end_lbl = self.new_label();
                let mut code = self.translate_cond(cond, table, body_lbl, end_lbl);
                self.emit(&mut code, Instr::Label(body_lbl));
                let then_code = self.translate_stmt(then, table, inner);
                let mut code = code.concat(then_code, &mut self.arena);
                self.emit(&mut code, Instr::Label(end_lbl));
                code
            }
            Stmt::If {
                cond,
                then,
                otherwise: Some(otherwise),
            } => {
                let then_lbl = self.new_label();
                let else_lbl = self.new_label();
                let end_lbl = self.new_label();
                let mut code = self.translate_cond(cond, table, then_lbl, else_lbl);
                self.emit(&mut code, Instr::Label(then_lbl));
                let then_code = self.translate_stmt(then, table, inner);
                let mut code = code.concat(then_code, &mut self.arena);
                self.emit(&mut code, Instr::Jump { target: end_lbl });
                self.emit(&mut code, Instr::Label(else_lbl));
                let else_code = self.translate_stmt(otherwise, table, inner);
                let mut code = code.concat(else_code, &mut self.arena);
                self.emit(&mut code, Instr::Label(end_lbl));
                code
            }
            Stmt::While { cond, body } => {
                let test_lbl = self.new_label();
                let body_lbl = self.new_label();
                let end_lbl = self.new_label();
                let mut code = IrList::new();
                self.emit(&mut code, Instr::Label(test_lbl));
                let cond_code = self.translate_cond(cond, table, body_lbl, end_lbl);
                let mut code = code.concat(cond_code, &mut self.arena);
                self.emit(&mut code, Instr::Label(body_lbl));
                let body_code = self.translate_stmt(body, table, inner);
                let mut code = code.concat(body_code, &mut self.arena);
                self.emit(&mut code, Instr::Jump { target: test_lbl });
                self.emit(&mut code, Instr::Label(end_lbl));
                code
            }
        }
    }

    /// Translate an expression so that its value ends up in `place`.
    /// A `Null` place discards the value but keeps all side effects.
    fn translate_exp(&mut self, expr: &Expr, table: &SymbolTable, place: Operand) -> IrList {
        match &expr.kind {
            ExprKind::Literal(value) => {
                let mut code = IrList::new();
                if !place.is_null() {
                    self.emit(
                        &mut code,
                        Instr::Assign {
                            dst: place,
                            src: Operand::Constant(*value),
                        },
                    );
                }
                code
            }
            ExprKind::Identifier(name) => {
                let mut code = IrList::new();
                if !place.is_null() {
                    let symbol = table
                        .lookup(name)
                        .expect("checked variable is no longer in scope");
                    self.emit(
                        &mut code,
                        Instr::Assign {
                            dst: place,
                            src: value_operand(symbol),
                        },
                    );
                }
                code
            }
            ExprKind::Negate(operand) => {
                if place.is_null() {
                    return self.translate_exp(operand, table, Operand::Null);
                }
                let value = self.new_temp();
                let mut code = self.translate_exp(operand, table, value);
                self.emit(
                    &mut code,
                    Instr::Bin {
                        op: BinOp::Sub,
                        dst: place,
                        lhs: Operand::Constant(0),
                        rhs: value,
                    },
                );
                code
            }
            ExprKind::Binary(op, lhs, rhs) => {
                if place.is_null() {
                    let lhs_code = self.translate_exp(lhs, table, Operand::Null);
                    let rhs_code = self.translate_exp(rhs, table, Operand::Null);
                    return lhs_code.concat(rhs_code, &mut self.arena);
                }
                let left = self.new_temp();
                let right = self.new_temp();
                let lhs_code = self.translate_exp(lhs, table, left);
                let rhs_code = self.translate_exp(rhs, table, right);
                let mut code = lhs_code.concat(rhs_code, &mut self.arena);
                self.emit(
                    &mut code,
                    Instr::Bin {
                        op: *op,
                        dst: place,
                        lhs: left,
                        rhs: right,
                    },
                );
                code
            }
            ExprKind::Assign(lhs, rhs) => self.translate_assign(lhs, rhs, table, place),
            ExprKind::Compare(..) | ExprKind::And(..) | ExprKind::Or(..) | ExprKind::Not(_) => {
                let place = if place.is_null() {
                    self.new_temp()
                } else {
                    place
                };
                self.cond_to_value(expr, table, place)
            }
            ExprKind::Call { name, args } => self.translate_call(name, args, table, place),
            ExprKind::Index { .. } | ExprKind::Member { .. } => {
                let (code, addr) = self.translate_address(expr, table);
                let mut code = code;
                if place.is_null() {
                    return code;
                }
                if self.type_of(expr, table).is_scalar() {
                    self.emit(&mut code, Instr::Load { dst: place, addr });
                } else {
                    // Non-scalar accesses yield the address of the aggregate.
                    self.emit(&mut code, Instr::Assign { dst: place, src: addr });
                }
                code
            }
        }
    }

    /// Translate an assignment. The right-hand side is evaluated into a
    /// temporary, stored through the left-hand side's address form, and
    /// copied on to `place` if a value is wanted.
    fn translate_assign(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        table: &SymbolTable,
        place: Operand,
    ) -> IrList {
        let value = self.new_temp();
        let mut code = self.translate_exp(rhs, table, value);

        match &lhs.kind {
            ExprKind::Identifier(name) => {
                let symbol = table
                    .lookup(name)
                    .expect("checked variable is no longer in scope");
                self.emit(
                    &mut code,
                    Instr::Assign {
                        dst: Operand::Variable(symbol.id),
                        src: value,
                    },
                );
            }
            ExprKind::Index { .. } | ExprKind::Member { .. } => {
                let (addr_code, addr) = self.translate_address(lhs, table);
                let mut joined = code.concat(addr_code, &mut self.arena);
                self.emit(&mut joined, Instr::Store { addr, src: value });
                code = joined;
            }
            _ => unreachable!("assignment target was validated by the checker"),
        }

        if !place.is_null() {
            self.emit(&mut code, Instr::Assign { dst: place, src: value });
        }
        code
    }

    fn translate_call(
        &mut self,
        name: &str,
        args: &[Expr],
        table: &SymbolTable,
        place: Operand,
    ) -> IrList {
        // Calls are never skipped in discard mode: they may have effects.
        match name {
            "read" => {
                let dst = if place.is_null() {
                    self.new_temp()
                } else {
                    place
                };
                let mut code = IrList::new();
                self.emit(&mut code, Instr::Read { dst });
                code
            }
            "write" => {
                let value = self.new_temp();
                let mut code = self.translate_exp(&args[0], table, value);
                self.emit(&mut code, Instr::Write { value });
                if !place.is_null() {
                    self.emit(
                        &mut code,
                        Instr::Assign {
                            dst: place,
                            src: Operand::Constant(0),
                        },
                    );
                }
                code
            }
            _ => {
                let mut code = IrList::new();
                let mut values = vec![];
                for arg in args {
                    let value = self.new_temp();
                    let arg_code = self.translate_exp(arg, table, value);
                    code = code.concat(arg_code, &mut self.arena);
                    values.push(value);
                }
                for value in values {
                    self.emit(&mut code, Instr::Arg { value });
                }
                let dst = if place.is_null() {
                    self.new_temp()
                } else {
                    place
                };
                self.emit(
                    &mut code,
                    Instr::Call {
                        dst,
                        function: name.to_string(),
                    },
                );
                code
            }
        }
    }

    /// Translate a boolean expression into control transfers: the emitted
    /// code jumps to `true_label` or `false_label` and never produces a
    /// data value.
    fn translate_cond(
        &mut self,
        expr: &Expr,
        table: &SymbolTable,
        true_label: Label,
        false_label: Label,
    ) -> IrList {
        match &expr.kind {
            ExprKind::Not(inner) => self.translate_cond(inner, table, false_label, true_label),
            ExprKind::And(lhs, rhs) => {
                let mid = self.new_label();
                let mut code = self.translate_cond(lhs, table, mid, false_label);
                self.emit(&mut code, Instr::Label(mid));
                let rhs_code = self.translate_cond(rhs, table, true_label, false_label);
                code.concat(rhs_code, &mut self.arena)
            }
            ExprKind::Or(lhs, rhs) => {
                let mid = self.new_label();
                let mut code = self.translate_cond(lhs, table, true_label, mid);
                self.emit(&mut code, Instr::Label(mid));
                let rhs_code = self.translate_cond(rhs, table, true_label, false_label);
                code.concat(rhs_code, &mut self.arena)
            }
            ExprKind::Compare(relop, lhs, rhs) => {
                let left = self.new_temp();
                let right = self.new_temp();
                let lhs_code = self.translate_exp(lhs, table, left);
                let rhs_code = self.translate_exp(rhs, table, right);
                let mut code = lhs_code.concat(rhs_code, &mut self.arena);
                self.emit(
                    &mut code,
                    Instr::JumpIf {
                        lhs: left,
                        op: *relop,
                        rhs: right,
                        target: true_label,
                    },
                );
                self.emit(
                    &mut code,
                    Instr::Jump {
                        target: false_label,
                    },
                );
                code
            }
            _ => {
                let value = self.new_temp();
                let mut code = self.translate_exp(expr, table, value);
                self.emit(
                    &mut code,
                    Instr::JumpIf {
                        lhs: value,
                        op: Relop::Neq,
                        rhs: Operand::Constant(0),
                        target: true_label,
                    },
                );
                self.emit(
                    &mut code,
                    Instr::Jump {
                        target: false_label,
                    },
                );
                code
            }
        }
    }

    /// Materialise a boolean expression as a 0/1 value in `place`.
    fn cond_to_value(&mut self, expr: &Expr, table: &SymbolTable, place: Operand) -> IrList {
        let true_lbl = self.new_label();
        let end_lbl = self.new_label();
        let mut code = IrList::new();
        self.emit(
            &mut code,
            Instr::Assign {
                dst: place,
                src: Operand::Constant(0),
            },
        );
        let cond_code = self.translate_cond(expr, table, true_lbl, end_lbl);
        let mut code = code.concat(cond_code, &mut self.arena);
        self.emit(&mut code, Instr::Label(true_lbl));
        self.emit(
            &mut code,
            Instr::Assign {
                dst: place,
                src: Operand::Constant(1),
            },
        );
        self.emit(&mut code, Instr::Label(end_lbl));
        code
    }

    /// Translate an access path to the address of the referenced storage.
    fn translate_address(&mut self, expr: &Expr, table: &SymbolTable) -> (IrList, Operand) {
        match &expr.kind {
            ExprKind::Identifier(name) => {
                let symbol = table
                    .lookup(name)
                    .expect("checked variable is no longer in scope");
                assert!(
                    !symbol.ty.is_scalar(),
                    "cannot take the address of a scalar variable"
                );
                (IrList::new(), value_operand(symbol))
            }
            ExprKind::Index { base, index } => {
                let elem_size = match &*self.type_of(base, table) {
                    Ty::Array { elem, .. } => elem.size(),
                    other => unreachable!("indexed a non-array type '{}'", other),
                };
                let (base_code, base_addr) = self.translate_address(base, table);
                let idx = self.new_temp();
                let idx_code = self.translate_exp(index, table, idx);
                let mut code = base_code.concat(idx_code, &mut self.arena);
                let offset = self.new_temp();
                self.emit(
                    &mut code,
                    Instr::Bin {
                        op: BinOp::Mul,
                        dst: offset,
                        lhs: idx,
                        rhs: Operand::Constant(elem_size as i32),
                    },
                );
                let addr = self.new_temp();
                self.emit(
                    &mut code,
                    Instr::Bin {
                        op: BinOp::Add,
                        dst: addr,
                        lhs: base_addr,
                        rhs: offset,
                    },
                );
                (code, addr)
            }
            ExprKind::Member { base, field } => {
                let base_ty = self.type_of(base, table);
                let offset = base_ty
                    .field(field)
                    .unwrap_or_else(|| unreachable!("unknown field '{}' survived checking", field))
                    .offset;
                let (mut code, base_addr) = self.translate_address(base, table);
                if offset == 0 {
                    return (code, base_addr);
                }
                let addr = self.new_temp();
                self.emit(
                    &mut code,
                    Instr::Bin {
                        op: BinOp::Add,
                        dst: addr,
                        lhs: base_addr,
                        rhs: Operand::Constant(offset as i32),
                    },
                );
                (code, addr)
            }
            // Any other aggregate-typed expression (a call returning a
            // struct or array) already evaluates to an address.
            _ => {
                let addr = self.new_temp();
                let code = self.translate_exp(expr, table, addr);
                (code, addr)
            }
        }
    }

    /// Re-derive the type of a checked expression.
    fn type_of(&self, expr: &Expr, table: &SymbolTable) -> Rc<Ty> {
        match &expr.kind {
            ExprKind::Identifier(name) => table
                .lookup(name)
                .expect("checked variable is no longer in scope")
                .ty
                .clone(),
            ExprKind::Index { base, .. } => match &*self.type_of(base, table) {
                Ty::Array { elem, .. } => elem.clone(),
                other => unreachable!("indexed a non-array type '{}'", other),
            },
            ExprKind::Member { base, field } => {
                let base_ty = self.type_of(base, table);
                base_ty
                    .field(field)
                    .unwrap_or_else(|| unreachable!("unknown field '{}' survived checking", field))
                    .ty
                    .clone()
            }
            ExprKind::Call { name, .. } => match name.as_str() {
                "read" | "write" => Ty::int(),
                _ => table
                    .function(name)
                    .expect("checked call target is unknown")
                    .returns
                    .clone(),
            },
            ExprKind::Assign(lhs, _) => self.type_of(lhs, table),
            _ => Ty::int(),
        }
    }

    fn emit(&mut self, list: &mut IrList, instr: Instr) {
        list.append(&mut self.arena, instr);
    }

    fn new_temp(&mut self) -> Operand {
        self.temps += 1;
        Operand::Temp(self.temps)
    }

    fn new_label(&mut self) -> Label {
        self.labels += 1;
        Label(self.labels)
    }
}

fn value_operand(symbol: &Symbol) -> Operand {
    if symbol.ty.is_scalar() || symbol.by_ref {
        Operand::Variable(symbol.id)
    } else {
        Operand::VAddress(symbol.id)
    }
}

/// The number of compound statements a block pops from the pending-block
/// queue while being translated: blocks reachable from its statement list
/// without crossing another block.
fn count_nested_blocks(stmts: &[Stmt]) -> usize {
    fn count(stmt: &Stmt) -> usize {
        match stmt {
            Stmt::Block(_) => 1,
            Stmt::If {
                then, otherwise, ..
            } => count(then) + otherwise.as_deref().map(count).unwrap_or(0),
            Stmt::While { body, .. } => count(body),
            Stmt::Expr(_) | Stmt::Return { .. } => 0,
        }
    }
    stmts.iter().map(count).sum()
}

#[cfg(test)]
mod tests {
    use crate::il::IrProgram;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::type_checking::analyse;

    fn translate(source: &str) -> IrProgram {
        let tokens = lex(source).expect("source should lex");
        let program = parse(&tokens).expect("source should parse");
        analyse(&program).expect("source should check")
    }

    macro_rules! assert_translates {
        ($source:expr, [$($line:expr),* $(,)?]) => {
            let program = translate($source);
            let rendered = program.render();
            let lines: Vec<&str> = rendered.lines().collect();
            assert_eq!(lines, vec![$($line),*]);
        };
    }

    #[test]
    fn translates_straight_line_arithmetic() {
        assert_translates!(
            "int main() { int a; a = 2 + 3; write(a); return 0; }",
            [
                "FUNCTION main :",
                "t2 := #2",
                "t3 := #3",
                "t1 := t2 + t3",
                "v1 := t1",
                "t4 := v1",
                "WRITE t4",
                "t5 := #0",
                "RETURN t5",
            ]
        );
    }

    #[test]
    fn short_circuits_logical_and() {
        assert_translates!(
            "int main() { int a = 1; int b = 0; if (a && b) write(1); return 0; }",
            [
                "FUNCTION main :",
                "t1 := #1",
                "v1 := t1",
                "t2 := #0",
                "v2 := t2",
                "t3 := v1",
                "IF t3 != #0 GOTO label3",
                "GOTO label2",
                "LABEL label3 :",
                "t4 := v2",
                "IF t4 != #0 GOTO label1",
                "GOTO label2",
                "LABEL label1 :",
                "t5 := #1",
                "WRITE t5",
                "LABEL label2 :",
                "t6 := #0",
                "RETURN t6",
            ]
        );
    }

    #[test]
    fn splices_sibling_and_branch_blocks_in_source_order() {
        assert_translates!(
            "int main() {
                 int a;
                 { a = 1; }
                 if (a > 0) { write(a); }
                 return 0;
             }",
            [
                "FUNCTION main :",
                "t1 := #1",
                "v1 := t1",
                "t3 := v1",
                "t4 := #0",
                "IF t3 > t4 GOTO label1",
                "GOTO label2",
                "LABEL label1 :",
                "t2 := v1",
                "WRITE t2",
                "LABEL label2 :",
                "t5 := #0",
                "RETURN t5",
            ]
        );
    }

    #[test]
    fn translates_loops_with_a_back_edge() {
        assert_translates!(
            "int main() { int i = 0; while (i < 3) i = i + 1; return i; }",
            [
                "FUNCTION main :",
                "t1 := #0",
                "v1 := t1",
                "LABEL label1 :",
                "t2 := v1",
                "t3 := #3",
                "IF t2 < t3 GOTO label2",
                "GOTO label3",
                "LABEL label2 :",
                "t5 := v1",
                "t6 := #1",
                "t4 := t5 + t6",
                "v1 := t4",
                "GOTO label1",
                "LABEL label3 :",
                "t7 := v1",
                "RETURN t7",
            ]
        );
    }

    #[test]
    fn indexes_arrays_through_address_arithmetic() {
        assert_translates!(
            "int main() { int a[3]; a[1] = read(); write(a[1]); return 0; }",
            [
                "FUNCTION main :",
                "DEC v1 12",
                "READ t1",
                "t2 := #1",
                "t3 := t2 * #4",
                "t4 := &v1 + t3",
                "*t4 := t1",
                "t6 := #1",
                "t7 := t6 * #4",
                "t8 := &v1 + t7",
                "t5 := *t8",
                "WRITE t5",
                "t9 := #0",
                "RETURN t9",
            ]
        );
    }

    #[test]
    fn passes_aggregates_by_address() {
        assert_translates!(
            "struct P { int x; int y; };
             int get(struct P p) { return p.y; }
             int main() { struct P p; p.y = 5; return get(p); }",
            [
                "FUNCTION get :",
                "PARAM v1",
                "t2 := v1 + #4",
                "t1 := *t2",
                "RETURN t1",
                "FUNCTION main :",
                "DEC v2 8",
                "t3 := #5",
                "t4 := &v2 + #4",
                "*t4 := t3",
                "t6 := &v2",
                "ARG t6",
                "t5 := CALL get",
                "RETURN t5",
            ]
        );
    }

    #[test]
    fn zero_offset_fields_reuse_the_base_address() {
        assert_translates!(
            "struct P { int x; };
             int main() { struct P p; p.x = 7; return p.x; }",
            [
                "FUNCTION main :",
                "DEC v1 4",
                "t1 := #7",
                "*&v1 := t1",
                "t2 := *&v1",
                "RETURN t2",
            ]
        );
    }

    #[test]
    fn discarded_calls_are_still_emitted() {
        assert_translates!(
            "int f() { return read(); }
             int main() { f(); return 0; }",
            [
                "FUNCTION f :",
                "READ t1",
                "RETURN t1",
                "FUNCTION main :",
                "t2 := CALL f",
                "t3 := #0",
                "RETURN t3",
            ]
        );
    }

    #[test]
    fn boolean_expressions_materialise_as_zero_or_one() {
        assert_translates!(
            "int main() { int a; a = 1 < 2; return a; }",
            [
                "FUNCTION main :",
                "t1 := #0",
                "t2 := #1",
                "t3 := #2",
                "IF t2 < t3 GOTO label1",
                "GOTO label2",
                "LABEL label1 :",
                "t1 := #1",
                "LABEL label2 :",
                "v1 := t1",
                "t4 := v1",
                "RETURN t4",
            ]
        );
    }

    #[test]
    fn translation_is_deterministic() {
        let source = "int main() { int a = 3; if (a || 0) a = -a; return a; }";
        assert_eq!(translate(source).render(), translate(source).render());
    }
}
