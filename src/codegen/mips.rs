//! MIPS32 instruction selection.
//!
//! Lowering uses a store/reload discipline: every operand is loaded into
//! `$t0`/`$t1` immediately before use and every result is stored back to
//! its frame slot immediately after definition, so no value lives in a
//! register across IR instructions. Arguments travel on the stack: the
//! caller pushes them below its own frame right before `jal` and pops them
//! right after, and the callee finds argument `k` at `frame_size + 4k`
//! from its own stack pointer.

use std::collections::HashMap;

use crate::il::{Instr, InstrId, IrArena, IrList, Operand, WORD};
use crate::parser::syntax_tree::{BinOp, Relop};

use super::frame::Frame;

/// Syscall wrappers for the two runtime builtins, plus section headers.
const PREAMBLE: &str = r#".data
_prompt: .asciiz "Enter an integer:"
_ret: .asciiz "\n"
.globl main
.text
read:
  li $v0, 4
  la $a0, _prompt
  syscall
  li $v0, 5
  syscall
  jr $ra

write:
  li $v0, 1
  syscall
  li $v0, 4
  la $a0, _ret
  syscall
  move $v0, $0
  jr $ra
"#;

pub fn emit(arena: &IrArena, code: &IrList, frames: &HashMap<InstrId, Frame>) -> String {
    let mut emitter = Emitter {
        arena,
        frames,
        out: String::from(PREAMBLE),
        frame: None,
        args: vec![],
        params: 0,
    };
    for id in code.iter(arena) {
        emitter.lower(id);
    }
    emitter.out
}

struct Emitter<'a> {
    arena: &'a IrArena,
    frames: &'a HashMap<InstrId, Frame>,
    out: String,
    frame: Option<&'a Frame>,
    /// Operands buffered by `Arg`, flushed by the next `Call`.
    args: Vec<Operand>,
    /// Parameters received so far in the current function.
    params: u32,
}
impl Emitter<'_> {
    fn lower(&mut self, id: InstrId) {
        match self.arena.get(id) {
            Instr::Function { name, frame_size } => {
                self.frame = Some(&self.frames[&id]);
                self.params = 0;
                self.out.push('\n');
                self.label(name);
                self.op(format!("subu $sp, $sp, {}", frame_size));
                self.op("sw $ra, 0($sp)".to_string());
                self.op("sw $fp, 4($sp)".to_string());
            }
            Instr::Label(label) => self.label(&label.to_string()),
            Instr::Assign { dst, src } => {
                self.load("$t0", *src, 0);
                self.store("$t0", *dst);
            }
            Instr::Bin { op, dst, lhs, rhs } => {
                self.load("$t0", *lhs, 0);
                self.load("$t1", *rhs, 0);
                match op {
                    BinOp::Add => self.op("add $t0, $t0, $t1".to_string()),
                    BinOp::Sub => self.op("sub $t0, $t0, $t1".to_string()),
                    BinOp::Mul => self.op("mul $t0, $t0, $t1".to_string()),
                    BinOp::Div => {
                        self.op("div $t0, $t1".to_string());
                        self.op("mflo $t0".to_string());
                    }
                }
                self.store("$t0", *dst);
            }
            Instr::Load { dst, addr } => {
                self.load("$t0", *addr, 0);
                self.op("lw $t0, 0($t0)".to_string());
                self.store("$t0", *dst);
            }
            Instr::Store { addr, src } => {
                self.load("$t0", *addr, 0);
                self.load("$t1", *src, 0);
                self.op("sw $t1, 0($t0)".to_string());
            }
            Instr::Jump { target } => self.op(format!("j {}", target)),
            Instr::JumpIf {
                lhs,
                op,
                rhs,
                target,
            } => {
                self.load("$t0", *lhs, 0);
                self.load("$t1", *rhs, 0);
                self.op(format!("{} $t0, $t1, {}", branch_for(*op), target));
            }
            Instr::Return { value, function } => {
                self.load("$v0", *value, 0);
                let function = function.expect("return was not tied to a function");
                let size = match self.arena.get(function) {
                    Instr::Function { frame_size, .. } => *frame_size,
                    _ => unreachable!("return back-reference is not a function"),
                };
                self.op("lw $ra, 0($sp)".to_string());
                self.op("lw $fp, 4($sp)".to_string());
                self.op(format!("addiu $sp, $sp, {}", size));
                self.op("jr $ra".to_string());
            }
            // Storage reservation has no runtime effect of its own.
            Instr::Dec { .. } => {}
            Instr::Arg { value } => self.args.push(*value),
            Instr::Call { dst, function } => {
                let args = std::mem::take(&mut self.args);
                let pushed = args.len() as u32 * WORD;
                if pushed > 0 {
                    self.op(format!("subu $sp, $sp, {}", pushed));
                    for (k, arg) in args.into_iter().enumerate() {
                        // The push moved $sp, so frame offsets are biased.
                        self.load("$t0", arg, pushed);
                        self.op(format!("sw $t0, {}($sp)", k as u32 * WORD));
                    }
                }
                self.op(format!("jal {}", function));
                if pushed > 0 {
                    self.op(format!("addiu $sp, $sp, {}", pushed));
                }
                self.store("$v0", *dst);
            }
            Instr::Param { var } => {
                let incoming = self.frame().size() + self.params * WORD;
                self.params += 1;
                self.op(format!("lw $t0, {}($sp)", incoming));
                self.store("$t0", *var);
            }
            Instr::Read { dst } => {
                self.op("jal read".to_string());
                self.store("$v0", *dst);
            }
            Instr::Write { value } => {
                self.load("$a0", *value, 0);
                self.op("jal write".to_string());
            }
        }
    }

    /// Load an operand into a register. `bias` corrects frame offsets when
    /// $sp has been temporarily moved by an argument push.
    fn load(&mut self, reg: &str, operand: Operand, bias: u32) {
        match operand {
            Operand::Constant(value) => self.op(format!("li {}, {}", reg, value)),
            Operand::Temp(_) | Operand::Variable(_) => {
                let offset = self.frame().offset_of(operand) + bias;
                self.op(format!("lw {}, {}($sp)", reg, offset));
            }
            Operand::VAddress(_) => {
                let offset = self.frame().offset_of(operand) + bias;
                self.op(format!("addi {}, $sp, {}", reg, offset));
            }
            Operand::MemBlock { .. } | Operand::Null => {
                unreachable!("operand {} cannot be loaded", operand)
            }
        }
    }

    fn store(&mut self, reg: &str, operand: Operand) {
        let offset = self.frame().offset_of(operand);
        self.op(format!("sw {}, {}($sp)", reg, offset));
    }

    fn frame(&self) -> &Frame {
        self.frame.expect("instruction outside of any function")
    }

    fn label(&mut self, name: &str) {
        self.out.push_str(name);
        self.out.push_str(":\n");
    }

    fn op(&mut self, text: String) {
        self.out.push_str("  ");
        self.out.push_str(&text);
        self.out.push('\n');
    }
}

fn branch_for(op: Relop) -> &'static str {
    match op {
        Relop::Lt => "blt",
        Relop::Lte => "ble",
        Relop::Gt => "bgt",
        Relop::Gte => "bge",
        Relop::Eq => "beq",
        Relop::Neq => "bne",
    }
}
