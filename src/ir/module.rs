use std::fmt;

use indexmap::IndexMap;

use super::function::Function;
use super::instruction::Inst;
use super::value::Value;

/// The unit of compilation: zero or more external declarations plus one or
/// more defined functions, keyed by name in insertion order so emission and
/// IR dumps are deterministic.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub functions: IndexMap<String, Function>,
}

impl Module {
    pub fn new() -> Self {
        Module { functions: IndexMap::new() }
    }

    pub fn add_function(&mut self, f: Function) {
        self.functions.insert(f.name.clone(), f);
    }

    pub fn defined_functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values().filter(|f| !f.is_extern())
    }

    pub fn defined_functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.functions.values_mut().filter(|f| !f.is_extern())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in self.functions.values() {
            if func.is_extern() {
                writeln!(f, "declare {}", func.signature())?;
                continue;
            }
            writeln!(f, "define {} {{", func.signature())?;
            for (idx, block) in func.blocks.iter().enumerate() {
                writeln!(f, "bb{idx}:")?;
                for id in block.all_insts() {
                    let inst = func.inst(id);
                    match inst.result_type() {
                        Some(ty) if !ty.is_void() => {
                            writeln!(f, "  {} = {}", Value::Inst(id), inst)?;
                        }
                        _ => writeln!(f, "  {inst}")?,
                    }
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
