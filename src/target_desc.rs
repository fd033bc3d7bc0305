//! Target-description XML builder.
//!
//! Ad-hoc string concatenation with a separately hand-maintained size
//! estimate is an easy place for the two to drift apart, so this uses
//! `XmlWriter`, a thin wrapper around `String` whose single write
//! method is reused both to build the real document and (via a
//! throwaway instance) to estimate its size up front. The estimate
//! and the write loop can never disagree, since they're driven by the
//! exact same call sequence.

use crate::target::{Arch, RegisterClass, RegisterInfo};

/// A small string-writer abstraction for building the target XML.
/// Exists mainly so the "compute size, then write" pattern has one
/// call sequence to get both numbers from.
pub struct XmlWriter {
    buf: String,
}

impl XmlWriter {
    fn new(capacity_hint: usize) -> Self {
        XmlWriter {
            buf: String::with_capacity(capacity_hint),
        }
    }

    fn raw(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    fn into_string(self) -> String {
        self.buf
    }
}

fn reg_type_attr(class: RegisterClass) -> Option<&'static str> {
    match class {
        RegisterClass::ProgramCounter => Some("code_ptr"),
        RegisterClass::CodePointer => Some("code_ptr"),
        RegisterClass::StackPointer => Some("data_ptr"),
        RegisterClass::General | RegisterClass::Status => None,
    }
}

fn write_document(w: &mut XmlWriter, arch: Arch, registers: &[RegisterInfo]) {
    w.raw("<?xml version=\"1.0\"?>\n");
    w.raw("<!DOCTYPE target SYSTEM \"gdb-target.dtd\">\n");
    w.raw("<target version=\"1.0\">\n");
    w.raw("  <architecture>");
    w.raw(arch.gdb_arch_name());
    w.raw("</architecture>\n");
    w.raw("  <feature name=\"");
    w.raw(arch.core_feature_name());
    w.raw("\">\n");
    for reg in registers {
        w.raw("    <reg name=\"");
        w.raw(reg.name);
        w.raw("\" bitsize=\"");
        w.buf.push_str(&reg.bits.to_string());
        w.raw("\"");
        if let Some(ty) = reg_type_attr(reg.class) {
            w.raw(" type=\"");
            w.raw(ty);
            w.raw("\"");
        }
        w.raw("/>\n");
    }
    w.raw("  </feature>\n");
    w.raw("</target>\n");
}

/// Builds the full target-description XML document for `arch` and
/// `registers`. Called at most once per session; the caller is
/// responsible for caching the result.
pub fn build(arch: Arch, registers: &[RegisterInfo]) -> String {
    // Dry run with a throwaway writer to size the real allocation, so
    // `with_capacity` and the actual write are driven by identical
    // logic and cannot disagree about the document's shape.
    let mut probe = XmlWriter::new(0);
    write_document(&mut probe, arch, registers);
    let size = probe.buf.len();

    let mut w = XmlWriter::new(size);
    write_document(&mut w, arch, registers);
    debug_assert_eq!(w.buf.len(), size);
    w.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::RegisterInfo;

    const REGS: &[RegisterInfo] = &[
        RegisterInfo::new("r0", 32, RegisterClass::General),
        RegisterInfo::new("sp", 32, RegisterClass::StackPointer),
        RegisterInfo::new("pc", 32, RegisterClass::ProgramCounter),
    ];

    #[test]
    fn emits_architecture_and_feature_name() {
        let xml = build(Arch::Arm, REGS);
        assert!(xml.contains("<architecture>arm</architecture>"));
        assert!(xml.contains("org.gnu.gdb.arm.core"));
    }

    #[test]
    fn emits_type_only_for_pointer_classes() {
        let xml = build(Arch::Arm, REGS);
        assert!(xml.contains("name=\"r0\" bitsize=\"32\"/>"));
        assert!(xml.contains("name=\"sp\" bitsize=\"32\" type=\"data_ptr\"/>"));
        assert!(xml.contains("name=\"pc\" bitsize=\"32\" type=\"code_ptr\"/>"));
    }

    #[test]
    fn amd64_reuses_i386_core_feature_name() {
        // AMD64 maps to its own architecture string but shares i386's
        // core feature name, matching upstream GDB's XML schema.
        let xml = build(Arch::Amd64, REGS);
        assert!(xml.contains("<architecture>i386:x86-64</architecture>"));
        assert!(xml.contains("org.gnu.gdb.i386.core"));
        assert!(!xml.contains("org.gnu.gdb.arm.core"));
    }

    #[test]
    fn size_estimate_matches_actual_write() {
        let xml = build(Arch::X86, REGS);
        assert!(xml.capacity() >= xml.len());
    }
}
