use crate::bytecode::{CompiledBlock, Op, ProgramBc, op::CodeId};
use crate::lang::value::Value;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Print disassembly of a bytecode program
pub fn print_bc(bc: &ProgramBc) {
    print!("{}", disassemble(bc));
}

/// Render the whole program: a header, then every block in id order.
pub fn disassemble(bc: &ProgramBc) -> String {
    let mut out = String::new();
    let predecessors = collect_predecessors(bc);

    let _ = writeln!(out, "=== BYTECODE PROGRAM ===");
    let _ = writeln!(
        out,
        "entry: {}, {} blocks, {} slots\n",
        bc.entry,
        bc.blocks.len(),
        bc.slot_count
    );

    for block in &bc.blocks {
        let from = predecessors.get(&block.id).map(Vec::as_slice).unwrap_or(&[]);
        write_block(&mut out, block, bc.entry == block.id, from);
    }
    out
}

/// Blocks that transfer control into each block, in id order.
fn collect_predecessors(bc: &ProgramBc) -> BTreeMap<CodeId, Vec<CodeId>> {
    let mut preds: BTreeMap<CodeId, Vec<CodeId>> = BTreeMap::new();
    for block in &bc.blocks {
        for op in &block.ops {
            for target in op.targets() {
                let list = preds.entry(target).or_default();
                if !list.contains(&block.id) {
                    list.push(block.id);
                }
            }
        }
    }
    preds
}

fn write_block(out: &mut String, block: &CompiledBlock, is_entry: bool, from: &[CodeId]) {
    let marker = if is_entry { "▶ entry" } else { "" };

    let _ = writeln!(out, "════════════════════════════════════════");
    let _ = writeln!(out, " {} ({}) {}", block.id, block.origin, marker);
    let _ = writeln!(out, " {} instructions", block.ops.len());
    if !from.is_empty() {
        let names: Vec<String> = from.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, " from: {}", names.join(", "));
    }
    for constant in &block.constants {
        let _ = writeln!(
            out,
            " const r{} = {}",
            constant.slot,
            format_value(&constant.value)
        );
    }
    let _ = writeln!(out, "════════════════════════════════════════");

    for (pc, op) in block.ops.iter().enumerate() {
        let _ = write!(out, "{:04}   ", pc);
        let _ = write!(out, "{}", format_op(op));
        if let Some(line) = block.line(pc) {
            let _ = write!(out, "    ; line {}", line);
        }
        out.push('\n');
    }
    out.push('\n');
}

/// One-line rendering of an op, e.g. `CONCAT      r4, r2, r3`.
pub fn format_op(op: &Op) -> String {
    let operands = match op {
        Op::Echo { value } => format!("r{}", value),
        Op::Assign { result, var, expr } => format!("r{}, r{} ← r{}", result, var, expr),
        Op::Concat {
            result,
            left,
            right,
        }
        | Op::Plus {
            result,
            left,
            right,
        }
        | Op::Minus {
            result,
            left,
            right,
        }
        | Op::Mul {
            result,
            left,
            right,
        }
        | Op::Smaller {
            result,
            left,
            right,
        }
        | Op::SmallerOrEqual {
            result,
            left,
            right,
        }
        | Op::Greater {
            result,
            left,
            right,
        }
        | Op::GreaterOrEqual {
            result,
            left,
            right,
        }
        | Op::Equal {
            result,
            left,
            right,
        }
        | Op::NotEqual {
            result,
            left,
            right,
        } => format!("r{} ← r{}, r{}", result, left, right),
        Op::ConstFetch {
            result,
            name,
            ns_name,
        } => match ns_name {
            Some(ns) => format!("r{} ← const(r{} | r{})", result, ns, name),
            None => format!("r{} ← const(r{})", result, name),
        },
        Op::Jump { target } => format!("→ {}", target),
        Op::JumpIf {
            cond,
            if_true,
            if_false,
        } => format!("r{} ? → {} : → {}", cond, if_true, if_false),
    };
    format!("{:<12}{}", op.mnemonic(), operands)
}

fn format_value(v: &Value) -> String {
    match v {
        Value::Unknown => "<unknown>".to_string(),
        Value::String(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
        Value::Integer(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
    }
}
