//! IR optimisation passes.
//!
//! Five sweeps over the whole program list, in order: constant
//! propagation/folding, copy propagation, importance marking, dead-store
//! elimination, and peephole cleanup. The forward passes share one fact
//! map; facts are timestamp-gated rather than physically cleared, so a
//! fact recorded before the most recent join point (a `Label` or
//! `Function` marker, where control can arrive from elsewhere) is simply
//! ignored.
//!
//! Aliasing policy: loads through `VAddress`/`MemBlock` addresses are
//! never assumed constant and stores through them are never eliminated,
//! since two such addresses cannot be proven distinct.

use std::collections::HashMap;

use log::debug;

use crate::parser::syntax_tree::BinOp;

use super::ir::{Instr, Operand};
use super::list::{IrArena, IrList};
use super::IrProgram;

pub fn optimise(program: &mut IrProgram) {
    let IrProgram { arena, code } = program;
    let mut facts = FactMap::new();
    fold_constants(arena, code, &mut facts);
    propagate_copies(arena, code, &mut facts);
    mark_importance(arena, code, &mut facts);
    eliminate_dead_stores(arena, code, &mut facts);
    peephole(arena, code);
}

/// The storage a fact is about. Tracking the operand kind in the key keeps
/// a temporary's facts from ever colliding with a variable of the same
/// number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Temp(u32),
    Var(u32),
    Addr(u32),
    Block(u32),
}

fn slot_of(operand: Operand) -> Option<Slot> {
    match operand {
        Operand::Temp(id) => Some(Slot::Temp(id)),
        Operand::Variable(id) => Some(Slot::Var(id)),
        Operand::VAddress(id) => Some(Slot::Addr(id)),
        Operand::MemBlock { id, .. } => Some(Slot::Block(id)),
        Operand::Constant(_) | Operand::Null => None,
    }
}

/// What a slot was last defined to hold, if anything usable.
#[derive(Debug, Clone, Copy)]
enum Rhs {
    Const(i32),
    Copy(Operand),
}

#[derive(Debug, Default)]
struct Fact {
    rhs: Option<Rhs>,
    ts: u64,
    important: bool,
    active: bool,
}

/// One fact per slot, shared by every pass. `valid_from` is the watermark
/// bumped at each join point; a `rhs` fact older than the watermark is
/// stale.
struct FactMap {
    facts: HashMap<Slot, Fact>,
    timestamp: u64,
    valid_from: u64,
}
impl FactMap {
    fn new() -> Self {
        Self {
            facts: HashMap::new(),
            timestamp: 0,
            valid_from: 0,
        }
    }

    fn tick(&mut self) {
        self.timestamp += 1;
    }

    /// Control can arrive here from elsewhere: all recorded values become
    /// stale.
    fn join(&mut self) {
        self.tick();
        self.valid_from = self.timestamp;
    }

    fn entry(&mut self, slot: Slot) -> &mut Fact {
        self.facts.entry(slot).or_default()
    }

    fn record(&mut self, operand: Operand, rhs: Rhs) {
        let ts = self.timestamp;
        if let Some(slot) = slot_of(operand) {
            let fact = self.entry(slot);
            fact.rhs = Some(rhs);
            fact.ts = ts;
        }
    }

    /// The slot was redefined to something we cannot describe.
    fn kill(&mut self, operand: Operand) {
        let ts = self.timestamp;
        if let Some(slot) = slot_of(operand) {
            let fact = self.entry(slot);
            fact.rhs = None;
            fact.ts = ts;
        }
    }

    /// Drop every copy fact whose recorded source is the redefined slot;
    /// those copies now describe the old value.
    fn kill_copies_of(&mut self, operand: Operand) {
        let Some(slot) = slot_of(operand) else {
            return;
        };
        for fact in self.facts.values_mut() {
            if let Some(Rhs::Copy(src)) = fact.rhs {
                if slot_of(src) == Some(slot) {
                    fact.rhs = None;
                }
            }
        }
    }

    fn lookup(&self, operand: Operand) -> Option<Rhs> {
        let slot = slot_of(operand)?;
        let fact = self.facts.get(&slot)?;
        if fact.ts < self.valid_from {
            return None;
        }
        fact.rhs
    }

    fn mark_important(&mut self, operand: Operand) {
        if let Some(slot) = slot_of(operand) {
            self.entry(slot).important = true;
        }
    }

    /// A slot with no fact at all is treated as important: every defined
    /// slot gained a fact during the forward passes, so an unknown slot
    /// means we know nothing and must not delete.
    fn is_important(&self, operand: Operand) -> bool {
        match slot_of(operand) {
            Some(slot) => self.facts.get(&slot).map_or(true, |f| f.important),
            None => false,
        }
    }

    fn set_active(&mut self, operand: Operand) {
        if let Some(slot) = slot_of(operand) {
            self.entry(slot).active = true;
        }
    }

    fn clear_active(&mut self, operand: Operand) {
        if let Some(slot) = slot_of(operand) {
            self.entry(slot).active = false;
        }
    }

    fn is_active(&self, operand: Operand) -> bool {
        match slot_of(operand) {
            Some(slot) => self.facts.get(&slot).map_or(false, |f| f.active),
            None => false,
        }
    }
}

/// Pass 1: forward constant propagation and folding.
fn fold_constants(arena: &mut IrArena, code: &mut IrList, facts: &mut FactMap) {
    let mut folded = 0;
    let mut cursor = code.head();
    while let Some(id) = cursor {
        cursor = arena.next(id);
        facts.tick();
        let instr = arena.get_mut(id);
        match instr {
            Instr::Label(_) | Instr::Function { .. } => facts.join(),
            Instr::Assign { dst, src } => {
                subst_const(facts, src);
                let (dst, src) = (*dst, *src);
                match src {
                    Operand::Constant(value) => facts.record(dst, Rhs::Const(value)),
                    _ => facts.kill(dst),
                }
            }
            Instr::Bin { op, dst, lhs, rhs } => {
                subst_const(facts, lhs);
                subst_const(facts, rhs);
                let dst = *dst;
                match simplify_bin(*op, dst, *lhs, *rhs) {
                    Some(simplified) => {
                        if let Instr::Assign {
                            src: Operand::Constant(value),
                            ..
                        } = simplified
                        {
                            facts.record(dst, Rhs::Const(value));
                        } else {
                            facts.kill(dst);
                        }
                        *instr = simplified;
                        folded += 1;
                    }
                    None => facts.kill(dst),
                }
            }
            // The address denotes memory, never a value.
            Instr::Load { dst, .. } => {
                let dst = *dst;
                facts.kill(dst);
            }
            Instr::Store { src, .. } => subst_const(facts, src),
            Instr::JumpIf { lhs, rhs, .. } => {
                subst_const(facts, lhs);
                subst_const(facts, rhs);
            }
            Instr::Return { value, .. } => subst_const(facts, value),
            Instr::Arg { value } | Instr::Write { value } => subst_const(facts, value),
            Instr::Call { dst, .. } | Instr::Read { dst } => {
                let dst = *dst;
                facts.kill(dst);
            }
            Instr::Param { var } | Instr::Dec { var, .. } => {
                let var = *var;
                facts.kill(var);
            }
            Instr::Jump { .. } => {}
        }
    }
    debug!("constant folding rewrote {} instructions", folded);
}

fn subst_const(facts: &FactMap, operand: &mut Operand) {
    if let Some(Rhs::Const(value)) = facts.lookup(*operand) {
        *operand = Operand::Constant(value);
    }
}

/// Fold a binary operation whose operands are (partially) constant.
/// Division by a constant zero is never folded; it is left for run time.
fn simplify_bin(op: BinOp, dst: Operand, lhs: Operand, rhs: Operand) -> Option<Instr> {
    use Operand::Constant;
    let src = match (op, lhs, rhs) {
        (_, Constant(a), Constant(b)) => {
            let value = match op {
                BinOp::Add => a.wrapping_add(b),
                BinOp::Sub => a.wrapping_sub(b),
                BinOp::Mul => a.wrapping_mul(b),
                BinOp::Div if b != 0 => a.wrapping_div(b),
                BinOp::Div => return None,
            };
            Constant(value)
        }
        (BinOp::Add, Constant(0), other) | (BinOp::Add, other, Constant(0)) => other,
        (BinOp::Sub, other, Constant(0)) => other,
        (BinOp::Mul, Constant(0), _) | (BinOp::Mul, _, Constant(0)) => Constant(0),
        _ => return None,
    };
    Some(Instr::Assign { dst, src })
}

/// Pass 2: forward copy propagation, with the same join-point staleness
/// rule as pass 1.
fn propagate_copies(arena: &mut IrArena, code: &mut IrList, facts: &mut FactMap) {
    // Everything recorded by the folding pass is stale for this sweep.
    facts.join();
    let mut cursor = code.head();
    while let Some(id) = cursor {
        cursor = arena.next(id);
        facts.tick();
        match arena.get_mut(id) {
            Instr::Label(_) | Instr::Function { .. } => facts.join(),
            Instr::Assign { dst, src } => {
                subst_copy(facts, src);
                let (dst, src) = (*dst, *src);
                facts.kill_copies_of(dst);
                match src {
                    Operand::Temp(_) | Operand::Variable(_) | Operand::VAddress(_)
                        if src != dst =>
                    {
                        facts.record(dst, Rhs::Copy(src))
                    }
                    _ => facts.kill(dst),
                }
            }
            Instr::Bin { dst, lhs, rhs, .. } => {
                subst_copy(facts, lhs);
                subst_copy(facts, rhs);
                let dst = *dst;
                facts.kill(dst);
                facts.kill_copies_of(dst);
            }
            Instr::Load { dst, addr } => {
                subst_copy(facts, addr);
                let dst = *dst;
                facts.kill(dst);
                facts.kill_copies_of(dst);
            }
            Instr::Store { addr, src } => {
                subst_copy(facts, addr);
                subst_copy(facts, src);
            }
            Instr::JumpIf { lhs, rhs, .. } => {
                subst_copy(facts, lhs);
                subst_copy(facts, rhs);
            }
            Instr::Return { value, .. } => subst_copy(facts, value),
            Instr::Arg { value } | Instr::Write { value } => subst_copy(facts, value),
            Instr::Call { dst, .. } | Instr::Read { dst } => {
                let dst = *dst;
                facts.kill(dst);
                facts.kill_copies_of(dst);
            }
            Instr::Param { var } | Instr::Dec { var, .. } => {
                let var = *var;
                facts.kill(var);
                facts.kill_copies_of(var);
            }
            Instr::Jump { .. } => {}
        }
    }
}

fn subst_copy(facts: &FactMap, operand: &mut Operand) {
    if let Some(Rhs::Copy(src)) = facts.lookup(*operand) {
        *operand = src;
    }
}

/// Pass 3: backward importance marking. An operand is important if it
/// feeds a store, a branch, a return or an external effect, directly or
/// through a chain of definitions.
fn mark_importance(arena: &IrArena, code: &IrList, facts: &mut FactMap) {
    let mut cursor = code.tail();
    while let Some(id) = cursor {
        cursor = arena.prev(id);
        match arena.get(id) {
            Instr::Store { addr, src } => {
                facts.mark_important(*addr);
                facts.mark_important(*src);
            }
            Instr::JumpIf { lhs, rhs, .. } => {
                facts.mark_important(*lhs);
                facts.mark_important(*rhs);
            }
            Instr::Return { value, .. }
            | Instr::Arg { value }
            | Instr::Write { value } => facts.mark_important(*value),
            Instr::Assign { dst, src } => {
                if facts.is_important(*dst) {
                    facts.mark_important(*src);
                }
            }
            Instr::Bin { dst, lhs, rhs, .. } => {
                if facts.is_important(*dst) {
                    facts.mark_important(*lhs);
                    facts.mark_important(*rhs);
                }
            }
            Instr::Load { dst, addr } => {
                if facts.is_important(*dst) {
                    facts.mark_important(*addr);
                }
            }
            _ => {}
        }
    }
}

/// Pass 4: backward dead-store elimination. A definition whose destination
/// is neither important nor active computes a value nobody needs.
fn eliminate_dead_stores(arena: &mut IrArena, code: &mut IrList, facts: &mut FactMap) {
    let mut removed = 0;
    let mut cursor = code.tail();
    while let Some(id) = cursor {
        cursor = arena.prev(id);
        let instr = arena.get(id).clone();
        match instr {
            Instr::Assign { dst, src } => {
                if !facts.is_important(dst) && !facts.is_active(dst) {
                    code.remove(arena, id);
                    removed += 1;
                } else {
                    facts.clear_active(dst);
                    facts.set_active(src);
                }
            }
            Instr::Bin { dst, lhs, rhs, .. } => {
                if !facts.is_important(dst) && !facts.is_active(dst) {
                    code.remove(arena, id);
                    removed += 1;
                } else {
                    facts.clear_active(dst);
                    facts.set_active(lhs);
                    facts.set_active(rhs);
                }
            }
            Instr::Load { dst, addr } => {
                if !facts.is_important(dst) && !facts.is_active(dst) {
                    code.remove(arena, id);
                    removed += 1;
                } else {
                    facts.clear_active(dst);
                    facts.set_active(addr);
                }
            }
            // Never deleted: their effects go beyond the destination.
            Instr::Store { addr, src } => {
                facts.set_active(addr);
                facts.set_active(src);
            }
            Instr::Call { dst, .. } | Instr::Read { dst } => facts.clear_active(dst),
            Instr::Param { var } | Instr::Dec { var, .. } => facts.clear_active(var),
            Instr::JumpIf { lhs, rhs, .. } => {
                facts.set_active(lhs);
                facts.set_active(rhs);
            }
            Instr::Return { value, .. }
            | Instr::Arg { value }
            | Instr::Write { value } => facts.set_active(value),
            Instr::Label(_) | Instr::Function { .. } | Instr::Jump { .. } => {}
        }
    }
    debug!("dead-store elimination removed {} instructions", removed);
}

/// Pass 5: forward peephole cleanup over adjacent instruction pairs.
fn peephole(arena: &mut IrArena, code: &mut IrList) {
    enum Action {
        Keep,
        DeleteCurrent,
        DeleteNext,
    }

    let mut cursor = code.head();
    while let Some(id) = cursor {
        let Some(next) = arena.next(id) else {
            break;
        };
        let action = match (arena.get(id), arena.get(next)) {
            // The second return is unreachable.
            (Instr::Return { .. }, Instr::Return { .. }) => Action::DeleteNext,
            // A jump to the label it falls through to.
            (Instr::Jump { target }, Instr::Label(label)) if target == label => {
                Action::DeleteCurrent
            }
            // A definition overwritten before anything reads it.
            (Instr::Assign { dst, .. } | Instr::Bin { dst, .. }, follower)
                if defined_operand(follower) == Some(*dst) && !reads(follower, *dst) =>
            {
                Action::DeleteCurrent
            }
            _ => Action::Keep,
        };
        match action {
            // Stay put so the new pair at this position is re-examined.
            Action::DeleteNext => code.remove(arena, next),
            Action::DeleteCurrent => {
                code.remove(arena, id);
                cursor = Some(next);
            }
            Action::Keep => cursor = Some(next),
        }
    }
}

fn defined_operand(instr: &Instr) -> Option<Operand> {
    match instr {
        Instr::Assign { dst, .. }
        | Instr::Bin { dst, .. }
        | Instr::Load { dst, .. }
        | Instr::Call { dst, .. }
        | Instr::Read { dst } => Some(*dst),
        _ => None,
    }
}

fn reads(instr: &Instr, operand: Operand) -> bool {
    match instr {
        Instr::Assign { src, .. } => *src == operand,
        Instr::Bin { lhs, rhs, .. } => *lhs == operand || *rhs == operand,
        Instr::Load { addr, .. } => *addr == operand,
        Instr::Store { addr, src } => *addr == operand || *src == operand,
        Instr::JumpIf { lhs, rhs, .. } => *lhs == operand || *rhs == operand,
        Instr::Return { value, .. } | Instr::Arg { value } | Instr::Write { value } => {
            *value == operand
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{Label, WORD};
    use crate::parser::syntax_tree::Relop;

    fn function(name: &str) -> Instr {
        Instr::Function {
            name: name.to_string(),
            frame_size: 0,
        }
    }

    fn program(instrs: Vec<Instr>) -> IrProgram {
        let mut arena = IrArena::new();
        let mut code = IrList::new();
        for instr in instrs {
            code.append(&mut arena, instr);
        }
        IrProgram { arena, code }
    }

    macro_rules! assert_optimises {
        ([$($instr:expr),* $(,)?], [$($line:expr),* $(,)?]) => {
            let mut program = program(vec![$($instr),*]);
            optimise(&mut program);
            let rendered = program.render();
            let lines: Vec<&str> = rendered.lines().collect();
            assert_eq!(lines, vec![$($line),*]);
        };
    }

    use Operand::{Constant, Temp, Variable};

    fn assign(dst: Operand, src: Operand) -> Instr {
        Instr::Assign { dst, src }
    }

    fn bin(op: BinOp, dst: Operand, lhs: Operand, rhs: Operand) -> Instr {
        Instr::Bin { op, dst, lhs, rhs }
    }

    #[test]
    fn folds_constant_chains_and_drops_the_scaffolding() {
        assert_optimises!(
            [
                function("main"),
                assign(Temp(1), Constant(2)),
                assign(Temp(2), Constant(3)),
                bin(BinOp::Add, Temp(3), Temp(1), Temp(2)),
                Instr::Write { value: Temp(3) },
                assign(Temp(4), Constant(0)),
                Instr::Return {
                    value: Temp(4),
                    function: None,
                },
            ],
            ["FUNCTION main :", "WRITE #5", "RETURN #0"]
        );
    }

    #[test]
    fn folds_each_arithmetic_operator() {
        assert_optimises!(
            [
                function("main"),
                bin(BinOp::Sub, Temp(1), Constant(7), Constant(3)),
                Instr::Write { value: Temp(1) },
                bin(BinOp::Mul, Temp(2), Constant(4), Constant(5)),
                Instr::Write { value: Temp(2) },
                bin(BinOp::Div, Temp(3), Constant(9), Constant(2)),
                Instr::Write { value: Temp(3) },
                Instr::Return {
                    value: Constant(0),
                    function: None,
                },
            ],
            [
                "FUNCTION main :",
                "WRITE #4",
                "WRITE #20",
                "WRITE #4",
                "RETURN #0",
            ]
        );
    }

    #[test]
    fn never_folds_division_by_a_constant_zero() {
        assert_optimises!(
            [
                function("main"),
                bin(BinOp::Div, Temp(1), Constant(1), Constant(0)),
                Instr::Write { value: Temp(1) },
                Instr::Return {
                    value: Constant(0),
                    function: None,
                },
            ],
            [
                "FUNCTION main :",
                "t1 := #1 / #0",
                "WRITE t1",
                "RETURN #0",
            ]
        );
    }

    #[test]
    fn applies_algebraic_identities() {
        assert_optimises!(
            [
                function("main"),
                Instr::Read { dst: Variable(1) },
                bin(BinOp::Add, Temp(1), Variable(1), Constant(0)),
                Instr::Write { value: Temp(1) },
                Instr::Read { dst: Variable(2) },
                bin(BinOp::Mul, Temp(2), Variable(2), Constant(0)),
                Instr::Write { value: Temp(2) },
                Instr::Return {
                    value: Constant(0),
                    function: None,
                },
            ],
            [
                "FUNCTION main :",
                "READ v1",
                "WRITE v1",
                "READ v2",
                "WRITE #0",
                "RETURN #0",
            ]
        );
    }

    #[test]
    fn constant_facts_go_stale_at_labels() {
        assert_optimises!(
            [
                function("main"),
                assign(Variable(1), Constant(1)),
                Instr::Label(Label(1)),
                bin(BinOp::Add, Temp(1), Variable(1), Constant(1)),
                Instr::JumpIf {
                    lhs: Temp(1),
                    op: Relop::Lt,
                    rhs: Constant(10),
                    target: Label(1),
                },
                Instr::Return {
                    value: Temp(1),
                    function: None,
                },
            ],
            [
                "FUNCTION main :",
                "v1 := #1",
                "LABEL label1 :",
                "t1 := v1 + #1",
                "IF t1 < #10 GOTO label1",
                "RETURN t1",
            ]
        );
    }

    #[test]
    fn propagates_copies_through_definitions() {
        assert_optimises!(
            [
                function("f"),
                Instr::Param { var: Variable(1) },
                assign(Temp(1), Variable(1)),
                bin(BinOp::Add, Temp(2), Temp(1), Constant(1)),
                assign(Variable(2), Temp(2)),
                Instr::Return {
                    value: Variable(2),
                    function: None,
                },
            ],
            [
                "FUNCTION f :",
                "PARAM v1",
                "t2 := v1 + #1",
                "RETURN t2",
            ]
        );
    }

    #[test]
    fn a_redefined_source_invalidates_its_copies() {
        // t1 snapshots v1 before v1 is overwritten; the write must keep
        // reading the snapshot.
        assert_optimises!(
            [
                function("main"),
                Instr::Read { dst: Variable(1) },
                Instr::Read { dst: Variable(2) },
                assign(Temp(1), Variable(1)),
                assign(Variable(1), Variable(2)),
                assign(Temp(2), Temp(1)),
                Instr::Write { value: Temp(2) },
                Instr::Write { value: Variable(1) },
                Instr::Return {
                    value: Constant(0),
                    function: None,
                },
            ],
            [
                "FUNCTION main :",
                "READ v1",
                "READ v2",
                "t1 := v1",
                "v1 := v2",
                "WRITE t1",
                "WRITE v2",
                "RETURN #0",
            ]
        );
    }

    #[test]
    fn stores_through_addresses_are_never_deleted() {
        assert_optimises!(
            [
                function("main"),
                Instr::Dec {
                    var: Operand::MemBlock { id: 1, size: 3 * WORD },
                    size: 3 * WORD,
                },
                Instr::Store {
                    addr: Operand::VAddress(1),
                    src: Constant(7),
                },
                Instr::Return {
                    value: Constant(0),
                    function: None,
                },
            ],
            [
                "FUNCTION main :",
                "DEC v1 12",
                "*&v1 := #7",
                "RETURN #0",
            ]
        );
    }

    #[test]
    fn removes_a_jump_to_the_next_label() {
        assert_optimises!(
            [
                function("main"),
                Instr::Jump { target: Label(1) },
                Instr::Label(Label(1)),
                Instr::Write { value: Constant(1) },
                Instr::Return {
                    value: Constant(0),
                    function: None,
                },
            ],
            [
                "FUNCTION main :",
                "LABEL label1 :",
                "WRITE #1",
                "RETURN #0",
            ]
        );
    }

    #[test]
    fn drops_an_unreachable_duplicate_return() {
        assert_optimises!(
            [
                function("f"),
                Instr::Param { var: Variable(1) },
                Instr::Return {
                    value: Variable(1),
                    function: None,
                },
                Instr::Return {
                    value: Variable(1),
                    function: None,
                },
            ],
            ["FUNCTION f :", "PARAM v1", "RETURN v1"]
        );
    }

    #[test]
    fn drops_a_definition_overwritten_before_any_read() {
        assert_optimises!(
            [
                function("main"),
                Instr::Read { dst: Temp(1) },
                assign(Variable(1), Temp(1)),
                Instr::Read { dst: Variable(1) },
                Instr::Write { value: Variable(1) },
                Instr::Return {
                    value: Constant(0),
                    function: None,
                },
            ],
            [
                "FUNCTION main :",
                "READ t1",
                "READ v1",
                "WRITE v1",
                "RETURN #0",
            ]
        );
    }

    #[test]
    fn keeps_values_consumed_by_effects() {
        assert_optimises!(
            [
                function("main"),
                Instr::Read { dst: Temp(1) },
                bin(BinOp::Mul, Temp(2), Temp(1), Temp(1)),
                Instr::Arg { value: Temp(2) },
                Instr::Call {
                    dst: Temp(3),
                    function: "f".to_string(),
                },
                Instr::Return {
                    value: Temp(3),
                    function: None,
                },
            ],
            [
                "FUNCTION main :",
                "READ t1",
                "t2 := t1 * t1",
                "ARG t2",
                "t3 := CALL f",
                "RETURN t3",
            ]
        );
    }
}
