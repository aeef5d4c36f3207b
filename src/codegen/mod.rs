//! Target code generation.
pub mod frame;
pub mod mips;

use crate::il::IrProgram;

/// Lay out stack frames and lower the program to MIPS32 assembly.
pub fn assemble(program: &mut IrProgram) -> String {
    let frames = frame::allocate_frames(&mut program.arena, &program.code);
    mips::emit(&program.arena, &program.code, &frames)
}
