//! An arena-backed doubly linked instruction list.
//!
//! Instructions live in an [`IrArena`] and are addressed by handle; an
//! [`IrList`] is just a head/tail pair of handles. This keeps append,
//! splice and removal O(1) without raw sibling pointers.

use super::ir::Instr;

/// A handle to an instruction in an [`IrArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrId(u32);

struct Node {
    instr: Instr,
    prev: Option<InstrId>,
    next: Option<InstrId>,
}

/// Owns every instruction of the program. Removal unlinks a node but never
/// frees it, so handles stay valid for the lifetime of the arena.
pub struct IrArena {
    nodes: Vec<Node>,
}
impl IrArena {
    pub fn new() -> Self {
        Self { nodes: vec![] }
    }

    pub fn alloc(&mut self, instr: Instr) -> InstrId {
        let id = InstrId(self.nodes.len() as u32);
        self.nodes.push(Node {
            instr,
            prev: None,
            next: None,
        });
        id
    }

    pub fn get(&self, id: InstrId) -> &Instr {
        &self.nodes[id.0 as usize].instr
    }

    pub fn get_mut(&mut self, id: InstrId) -> &mut Instr {
        &mut self.nodes[id.0 as usize].instr
    }

    pub fn next(&self, id: InstrId) -> Option<InstrId> {
        self.nodes[id.0 as usize].next
    }

    pub fn prev(&self, id: InstrId) -> Option<InstrId> {
        self.nodes[id.0 as usize].prev
    }

    fn node_mut(&mut self, id: InstrId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }
}

/// A sequence of instructions in an arena.
#[derive(Debug, Default)]
pub struct IrList {
    head: Option<InstrId>,
    tail: Option<InstrId>,
}
impl IrList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<InstrId> {
        self.head
    }

    pub fn tail(&self) -> Option<InstrId> {
        self.tail
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Allocate `instr` and append it to this list.
    pub fn append(&mut self, arena: &mut IrArena, instr: Instr) -> InstrId {
        let id = arena.alloc(instr);
        match self.tail {
            None => {
                self.head = Some(id);
                self.tail = Some(id);
            }
            Some(tail) => {
                arena.node_mut(tail).next = Some(id);
                arena.node_mut(id).prev = Some(tail);
                self.tail = Some(id);
            }
        }
        id
    }

    /// Splice `other` onto the end of this list. Concatenating with an
    /// empty list leaves the other unchanged.
    pub fn concat(self, other: IrList, arena: &mut IrArena) -> IrList {
        match (self.tail, other.head) {
            (_, None) => self,
            (None, _) => other,
            (Some(tail), Some(head)) => {
                arena.node_mut(tail).next = Some(head);
                arena.node_mut(head).prev = Some(tail);
                IrList {
                    head: self.head,
                    tail: other.tail,
                }
            }
        }
    }

    /// Unlink an instruction from this list in O(1).
    pub fn remove(&mut self, arena: &mut IrArena, id: InstrId) {
        let (prev, next) = {
            let node = &arena.nodes[id.0 as usize];
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => arena.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => arena.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
        let node = arena.node_mut(id);
        node.prev = None;
        node.next = None;
    }

    /// Iterate over the instruction handles of this list.
    pub fn iter<'a>(&self, arena: &'a IrArena) -> Handles<'a> {
        Handles {
            arena,
            cursor: self.head,
        }
    }

    /// Render the whole list in the textual dump format, one instruction
    /// per line.
    pub fn render(&self, arena: &IrArena) -> String {
        let mut text = String::new();
        for id in self.iter(arena) {
            text.push_str(&arena.get(id).to_string());
            text.push('\n');
        }
        text
    }
}

pub struct Handles<'a> {
    arena: &'a IrArena,
    cursor: Option<InstrId>,
}
impl Iterator for Handles<'_> {
    type Item = InstrId;

    fn next(&mut self) -> Option<InstrId> {
        let id = self.cursor?;
        self.cursor = self.arena.next(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::ir::Operand;

    fn assign(dst: u32) -> Instr {
        Instr::Assign {
            dst: Operand::Temp(dst),
            src: Operand::Constant(0),
        }
    }

    fn collect(list: &IrList, arena: &IrArena) -> Vec<String> {
        list.iter(arena).map(|id| arena.get(id).to_string()).collect()
    }

    #[test]
    fn concat_with_empty_is_identity() {
        let mut arena = IrArena::new();
        let mut list = IrList::new();
        list.append(&mut arena, assign(1));
        list.append(&mut arena, assign(2));

        let list = list.concat(IrList::new(), &mut arena);
        let list = IrList::new().concat(list, &mut arena);
        assert_eq!(collect(&list, &arena), vec!["t1 := #0", "t2 := #0"]);
    }

    #[test]
    fn concat_splices_in_order() {
        let mut arena = IrArena::new();
        let mut first = IrList::new();
        first.append(&mut arena, assign(1));
        let mut second = IrList::new();
        second.append(&mut arena, assign(2));
        second.append(&mut arena, assign(3));

        let list = first.concat(second, &mut arena);
        assert_eq!(
            collect(&list, &arena),
            vec!["t1 := #0", "t2 := #0", "t3 := #0"]
        );
    }

    #[test]
    fn remove_restores_neighbour_adjacency() {
        let mut arena = IrArena::new();
        let mut list = IrList::new();
        let a = list.append(&mut arena, assign(1));
        let b = list.append(&mut arena, assign(2));
        let c = list.append(&mut arena, assign(3));

        list.remove(&mut arena, b);
        assert_eq!(collect(&list, &arena), vec!["t1 := #0", "t3 := #0"]);
        assert_eq!(arena.next(a), Some(c));
        assert_eq!(arena.prev(c), Some(a));
    }

    #[test]
    fn remove_at_boundaries_updates_head_and_tail() {
        let mut arena = IrArena::new();
        let mut list = IrList::new();
        let a = list.append(&mut arena, assign(1));
        let b = list.append(&mut arena, assign(2));
        let c = list.append(&mut arena, assign(3));

        list.remove(&mut arena, a);
        assert_eq!(list.head(), Some(b));
        list.remove(&mut arena, c);
        assert_eq!(list.tail(), Some(b));
        list.remove(&mut arena, b);
        assert!(list.is_empty());
    }
}
