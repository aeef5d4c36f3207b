//! The scope-stack symbol table.
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use super::types::Ty;

/// The name is already bound in the relevant namespace.
#[derive(Debug, Error)]
#[error("the name is already defined")]
pub struct AlreadyDefined;

/// A checked variable. `id` is unique across the whole program and doubles
/// as the variable's identity in the IR.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: u32,
    pub ty: Rc<Ty>,
    /// Non-scalar parameters are passed by reference: the variable holds
    /// an address rather than naming the storage itself.
    pub by_ref: bool,
}

#[derive(Debug)]
pub struct FunctionSig {
    pub returns: Rc<Ty>,
    pub params: Vec<Rc<Ty>>,
}

pub struct SymbolTable {
    scopes: Vec<HashMap<String, Symbol>>,
    functions: HashMap<String, Rc<FunctionSig>>,
    structs: HashMap<String, Rc<Ty>>,
    next_id: u32,
}
impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            functions: HashMap::new(),
            structs: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop().expect("scope stack underflow");
    }

    /// Declare a variable in the innermost scope. Fails if the name is
    /// already declared in that scope.
    pub fn declare(
        &mut self,
        name: &str,
        ty: Rc<Ty>,
        by_ref: bool,
    ) -> Result<Symbol, AlreadyDefined> {
        let scope = self.scopes.last_mut().expect("scope stack underflow");
        if scope.contains_key(name) {
            return Err(AlreadyDefined);
        }
        self.next_id += 1;
        let symbol = Symbol {
            id: self.next_id,
            ty,
            by_ref,
        };
        scope.insert(name.to_string(), symbol.clone());
        Ok(symbol)
    }

    /// Look up a variable, innermost scope first.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn declare_function(&mut self, name: &str, sig: FunctionSig) -> Result<(), AlreadyDefined> {
        if self.functions.contains_key(name) {
            return Err(AlreadyDefined);
        }
        self.functions.insert(name.to_string(), Rc::new(sig));
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&Rc<FunctionSig>> {
        self.functions.get(name)
    }

    pub fn declare_struct(&mut self, name: &str, ty: Rc<Ty>) -> Result<(), AlreadyDefined> {
        if self.structs.contains_key(name) {
            return Err(AlreadyDefined);
        }
        self.structs.insert(name.to_string(), ty);
        Ok(())
    }

    pub fn structure(&self, name: &str) -> Option<&Rc<Ty>> {
        self.structs.get(name)
    }
}
