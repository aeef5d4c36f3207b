//! Intermediate language generation and optimisation.
pub mod builder;
pub mod ir;
pub mod list;
pub mod optimiser;

pub use builder::Builder;
pub use ir::{Instr, Label, Operand, WORD};
pub use list::{InstrId, IrArena, IrList};

/// The translated program: an instruction arena plus the list threading
/// through it.
pub struct IrProgram {
    pub arena: IrArena,
    pub code: IrList,
}
impl IrProgram {
    /// Render the program in the textual dump format.
    pub fn render(&self) -> String {
        self.code.render(&self.arena)
    }
}
