//! Pseudo-code synthesis.
//!
//! Each recognized instruction is rewritten into at most one C-like statement.
//! Branches stay as `goto`s: no blocks are nested and every statement sits one
//! level inside a synthetic `void function_<start>() { ... }` wrapper.

use std::fmt;

use crate::{Address, Decoded, Insn};

/// One level of indentation.
pub const INDENT: &str = "    ";

/// Rewrite a single instruction as a statement.
///
/// Returns `None` for instructions that are suppressed at this level of
/// abstraction (`push`, `pop`, `nop`).
pub fn statement(insn: &Insn) -> Option<String> {
    let target = || insn.target.map(|t| format!("{:X}", t)).unwrap_or_default();

    let stmt = match insn.mnemonic {
        "mov" => format!("{};", insn.operands.replacen(", ", " = ", 1)),
        "push" | "pop" | "nop" => return None,
        "call" => format!("function_{}();", target()),
        "jmp" => format!("goto loc_{};", target()),
        "jz" | "jnz" | "jl" | "jle" | "jg" | "jge" => {
            format!("if (condition_{}) goto loc_{};", insn.mnemonic, target())
        }
        "ret" => "return;".to_string(),
        "int" => format!("interrupt({});", insn.operands),
        "cli" => "disable_interrupts();".to_string(),
        "sti" => "enable_interrupts();".to_string(),
        "hlt" => "halt();".to_string(),
        other => format!("// {} {}", other, insn.operands),
    };

    Some(stmt)
}

/// Synthesized pseudo-code for one decode session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoCode {
    /// Address the synthetic function is named after
    pub start: Address,
    /// Body statements, unindented, in memory order
    pub body: Vec<String>,
}

impl PseudoCode {
    /// Build pseudo-code from decoded entries in memory order.
    ///
    /// Skipped bytes contribute nothing.
    pub fn synthesize<'a, I>(start: Address, entries: I) -> Self
    where
        I: IntoIterator<Item = &'a Decoded>,
    {
        let body = entries
            .into_iter()
            .filter_map(Decoded::as_insn)
            .filter_map(statement)
            .collect();

        Self { start, body }
    }

    /// Name of the synthetic function wrapping the body
    pub fn function_name(&self) -> String {
        format!("function_{:X}", self.start)
    }

    /// Body lines with indentation applied
    pub fn indented_body(&self) -> impl Iterator<Item = String> + '_ {
        self.body.iter().map(|stmt| format!("{}{}", INDENT, stmt))
    }

    /// Every output line, wrapper included
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.body.len() + 3);
        lines.push(format!("void {}() {{", self.function_name()));
        lines.push(String::new());
        lines.extend(self.indented_body());
        lines.push("}".to_string());
        lines
    }
}

impl fmt::Display for PseudoCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
