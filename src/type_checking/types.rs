//! Resolved types, as attached to symbols by the checker.
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use crate::il::WORD;

/// A resolved type. Equality is structural; see [`Ty::equivalent`].
#[derive(Debug)]
pub enum Ty {
    Int,
    Array { elem: Rc<Ty>, len: u32 },
    Struct { name: Option<String>, fields: Vec<Field> },
}

/// A struct field with its byte offset, computed once at definition time.
#[derive(Debug)]
pub struct Field {
    pub name: String,
    pub ty: Rc<Ty>,
    pub offset: u32,
}

impl Ty {
    pub fn int() -> Rc<Ty> {
        Rc::new(Ty::Int)
    }

    /// Whether values of this type fit in a single word.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Ty::Int)
    }

    /// Storage size in bytes.
    pub fn size(&self) -> u32 {
        match self {
            Ty::Int => WORD,
            Ty::Array { elem, len } => elem.size() * len,
            Ty::Struct { fields, .. } => fields
                .last()
                .map(|f| f.offset + f.ty.size())
                .unwrap_or(0),
        }
    }

    /// Structural type equivalence: arrays match on element type (their
    /// lengths are ignored), structs match field-by-field on type.
    pub fn equivalent(&self, other: &Ty) -> bool {
        match (self, other) {
            (Ty::Int, Ty::Int) => true,
            (Ty::Array { elem: a, .. }, Ty::Array { elem: b, .. }) => a.equivalent(b),
            (Ty::Struct { fields: a, .. }, Ty::Struct { fields: b, .. }) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.ty.equivalent(&y.ty))
            }
            _ => false,
        }
    }

    /// Look up a field by linear scan of the field chain.
    pub fn field(&self, name: &str) -> Option<&Field> {
        match self {
            Ty::Struct { fields, .. } => fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }
}
impl Display for Ty {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Ty::Int => f.write_str("int"),
            Ty::Array { elem, len } => write!(f, "{}[{}]", elem, len),
            Ty::Struct {
                name: Some(name), ..
            } => write!(f, "struct {}", name),
            Ty::Struct { name: None, .. } => f.write_str("struct"),
        }
    }
}
