//! Stack frame layout.
//!
//! Every `Temp`/`Variable` operand of a function gets a word-sized slot in
//! that function's frame, in first-use order; a `MemBlock` gets a
//! contiguous block of its declared size. `VAddress` and `MemBlock`
//! operands share the variable's slot key, so the address of an aggregate
//! resolves to the start of its block.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::il::{Instr, InstrId, IrArena, IrList, Operand, WORD};

/// Bytes reserved at the bottom of every frame for the saved return
/// address and frame pointer.
pub const FRAME_HEADER: u32 = 2 * WORD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Slot {
    Temp(u32),
    Var(u32),
}

fn slot_of(operand: Operand) -> Option<Slot> {
    match operand {
        Operand::Temp(id) => Some(Slot::Temp(id)),
        Operand::Variable(id) | Operand::VAddress(id) | Operand::MemBlock { id, .. } => {
            Some(Slot::Var(id))
        }
        Operand::Constant(_) | Operand::Null => None,
    }
}

/// The storage layout of one function.
pub struct Frame {
    offsets: BTreeMap<Slot, u32>,
    next: u32,
}
impl Frame {
    fn new() -> Self {
        Self {
            offsets: BTreeMap::new(),
            next: FRAME_HEADER,
        }
    }

    fn insert(&mut self, operand: Operand) {
        let Some(slot) = slot_of(operand) else {
            return;
        };
        let size = match operand {
            Operand::MemBlock { size, .. } => {
                assert!(
                    !self.offsets.contains_key(&slot),
                    "storage block declared after first use"
                );
                size
            }
            _ => WORD,
        };
        if !self.offsets.contains_key(&slot) {
            self.offsets.insert(slot, self.next);
            self.next += size;
        }
    }

    /// Byte offset of the operand's storage from the stack pointer.
    pub fn offset_of(&self, operand: Operand) -> u32 {
        let slot = slot_of(operand)
            .unwrap_or_else(|| panic!("operand {} has no storage", operand));
        match self.offsets.get(&slot) {
            Some(offset) => *offset,
            None => panic!("operand {} referenced before definition", operand),
        }
    }

    pub fn size(&self) -> u32 {
        self.next
    }
}

/// Assign frame offsets for every function and patch each `Function`
/// instruction's frame size and each `Return`'s back-reference to its
/// enclosing function.
pub fn allocate_frames(arena: &mut IrArena, code: &IrList) -> HashMap<InstrId, Frame> {
    let mut frames = HashMap::new();
    let mut current: Option<(InstrId, Frame)> = None;
    let ids: Vec<InstrId> = code.iter(arena).collect();

    for id in ids {
        if let Instr::Function { .. } = arena.get(id) {
            if let Some((function, frame)) = current.take() {
                finish(arena, function, frame, &mut frames);
            }
            current = Some((id, Frame::new()));
            continue;
        }
        let (function, frame) = current
            .as_mut()
            .expect("instruction outside of any function");
        if let Instr::Return {
            function: back_ref, ..
        } = arena.get_mut(id)
        {
            *back_ref = Some(*function);
        }
        for_each_operand(arena.get(id), |operand| frame.insert(operand));
    }
    if let Some((function, frame)) = current.take() {
        finish(arena, function, frame, &mut frames);
    }
    frames
}

fn finish(
    arena: &mut IrArena,
    function: InstrId,
    frame: Frame,
    frames: &mut HashMap<InstrId, Frame>,
) {
    let size = frame.size();
    match arena.get_mut(function) {
        Instr::Function {
            name, frame_size, ..
        } => {
            debug!("function '{}' uses a {} byte frame", name, size);
            *frame_size = size;
        }
        _ => unreachable!("frame attached to a non-function instruction"),
    }
    frames.insert(function, frame);
}

fn for_each_operand(instr: &Instr, mut f: impl FnMut(Operand)) {
    match instr {
        Instr::Assign { dst, src } => {
            f(*dst);
            f(*src);
        }
        Instr::Bin { dst, lhs, rhs, .. } => {
            f(*dst);
            f(*lhs);
            f(*rhs);
        }
        Instr::Load { dst, addr } => {
            f(*dst);
            f(*addr);
        }
        Instr::Store { addr, src } => {
            f(*addr);
            f(*src);
        }
        Instr::JumpIf { lhs, rhs, .. } => {
            f(*lhs);
            f(*rhs);
        }
        Instr::Return { value, .. } => f(*value),
        Instr::Dec { var, .. } => f(*var),
        Instr::Arg { value } => f(*value),
        Instr::Call { dst, .. } => f(*dst),
        Instr::Param { var } => f(*var),
        Instr::Read { dst } => f(*dst),
        Instr::Write { value } => f(*value),
        Instr::Label(_) | Instr::Function { .. } | Instr::Jump { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::IrProgram;
    use crate::parser::syntax_tree::BinOp;

    fn program(instrs: Vec<Instr>) -> IrProgram {
        let mut arena = IrArena::new();
        let mut code = IrList::new();
        for instr in instrs {
            code.append(&mut arena, instr);
        }
        IrProgram { arena, code }
    }

    fn function(name: &str) -> Instr {
        Instr::Function {
            name: name.to_string(),
            frame_size: 0,
        }
    }

    #[test]
    fn scalars_get_word_slots_above_the_header() {
        let mut program = program(vec![
            function("f"),
            Instr::Param {
                var: Operand::Variable(1),
            },
            Instr::Bin {
                op: BinOp::Add,
                dst: Operand::Temp(1),
                lhs: Operand::Variable(1),
                rhs: Operand::Constant(1),
            },
            Instr::Return {
                value: Operand::Temp(1),
                function: None,
            },
        ]);
        let frames = allocate_frames(&mut program.arena, &program.code);

        let entry = program.code.head().unwrap();
        let frame = &frames[&entry];
        assert_eq!(frame.offset_of(Operand::Variable(1)), FRAME_HEADER);
        assert_eq!(frame.offset_of(Operand::Temp(1)), FRAME_HEADER + WORD);
        assert_eq!(frame.size(), FRAME_HEADER + 2 * WORD);
    }

    #[test]
    fn blocks_take_their_declared_size() {
        let mut program = program(vec![
            function("main"),
            Instr::Dec {
                var: Operand::MemBlock { id: 1, size: 12 },
                size: 12,
            },
            Instr::Store {
                addr: Operand::VAddress(1),
                src: Operand::Constant(7),
            },
            Instr::Read {
                dst: Operand::Variable(2),
            },
            Instr::Return {
                value: Operand::Variable(2),
                function: None,
            },
        ]);
        let frames = allocate_frames(&mut program.arena, &program.code);

        let entry = program.code.head().unwrap();
        let frame = &frames[&entry];
        assert_eq!(frame.offset_of(Operand::VAddress(1)), FRAME_HEADER);
        assert_eq!(frame.offset_of(Operand::Variable(2)), FRAME_HEADER + 12);
        assert_eq!(frame.size(), FRAME_HEADER + 12 + WORD);
    }

    #[test]
    fn frame_sizes_are_patched_and_returns_point_home() {
        let mut program = program(vec![
            function("f"),
            Instr::Return {
                value: Operand::Constant(0),
                function: None,
            },
            function("g"),
            Instr::Read {
                dst: Operand::Variable(1),
            },
            Instr::Return {
                value: Operand::Variable(1),
                function: None,
            },
        ]);
        allocate_frames(&mut program.arena, &program.code);

        let ids: Vec<InstrId> = program.code.iter(&program.arena).collect();
        assert!(matches!(
            program.arena.get(ids[0]),
            Instr::Function { frame_size, .. } if *frame_size == FRAME_HEADER
        ));
        assert!(matches!(
            program.arena.get(ids[1]),
            Instr::Return { function: Some(id), .. } if *id == ids[0]
        ));
        assert!(matches!(
            program.arena.get(ids[2]),
            Instr::Function { frame_size, .. } if *frame_size == FRAME_HEADER + WORD
        ));
        assert!(matches!(
            program.arena.get(ids[4]),
            Instr::Return { function: Some(id), .. } if *id == ids[2]
        ));
    }
}
