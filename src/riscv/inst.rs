//! RISC-V instruction helper layer (spec §4.5).
//!
//! The only way the rest of the emitter reaches assembly text. Mirrors the
//! original `riscv.cpp`'s `gen_*` functions one-for-one, but fixes their
//! "careful with this" register-counter juggling (the original's
//! `gen_addi`/`gen_sw`/`gen_lw` grow a scratch register off a shared,
//! manually incremented/decremented counter to dodge clobbering `rd`/`rs1`)
//! by reserving `t6` as a dedicated overflow scratch register that the rest
//! of the backend never allocates as a value register. That sidesteps the
//! original's aliasing bookkeeping entirely.

pub const IMM12_MIN: i32 = -2048;
pub const IMM12_MAX: i32 = 2047;
const SCRATCH: &str = "t6";

fn fits_imm12(imm: i32) -> bool {
    (IMM12_MIN..=IMM12_MAX).contains(&imm)
}

pub struct InstWriter {
    pub out: String,
    temp_label_id: u32,
}

impl InstWriter {
    pub fn new() -> Self {
        InstWriter {
            out: String::new(),
            temp_label_id: 0,
        }
    }

    fn line(&mut self, s: &str) {
        self.out.push('\t');
        self.out.push_str(s);
        self.out.push('\n');
    }

    pub fn label(&mut self, name: &str) {
        self.out.push_str(name);
        self.out.push_str(":\n");
    }

    pub fn raw(&mut self, s: &str) {
        self.out.push_str(s);
        self.out.push('\n');
    }

    pub fn li(&mut self, rd: &str, imm: i32) {
        self.line(&format!("li\t{}, {}", rd, imm));
    }

    pub fn mv(&mut self, rd: &str, rs: &str) {
        if rd != rs {
            self.line(&format!("mv\t{}, {}", rd, rs));
        }
    }

    pub fn la(&mut self, rd: &str, label: &str) {
        self.line(&format!("la\t{}, {}", rd, label));
    }

    pub fn add(&mut self, rd: &str, rs1: &str, rs2: &str) {
        self.line(&format!("add\t{}, {}, {}", rd, rs1, rs2));
    }

    pub fn sub(&mut self, rd: &str, rs1: &str, rs2: &str) {
        self.line(&format!("sub\t{}, {}, {}", rd, rs1, rs2));
    }

    pub fn mul(&mut self, rd: &str, rs1: &str, rs2: &str) {
        self.line(&format!("mul\t{}, {}, {}", rd, rs1, rs2));
    }

    pub fn div(&mut self, rd: &str, rs1: &str, rs2: &str) {
        self.line(&format!("div\t{}, {}, {}", rd, rs1, rs2));
    }

    pub fn rem(&mut self, rd: &str, rs1: &str, rs2: &str) {
        self.line(&format!("rem\t{}, {}, {}", rd, rs1, rs2));
    }

    pub fn and(&mut self, rd: &str, rs1: &str, rs2: &str) {
        self.line(&format!("and\t{}, {}, {}", rd, rs1, rs2));
    }

    pub fn or(&mut self, rd: &str, rs1: &str, rs2: &str) {
        self.line(&format!("or\t{}, {}, {}", rd, rs1, rs2));
    }

    pub fn xor(&mut self, rd: &str, rs1: &str, rs2: &str) {
        self.line(&format!("xor\t{}, {}, {}", rd, rs1, rs2));
    }

    pub fn xori(&mut self, rd: &str, rs1: &str, imm: i32) {
        self.line(&format!("xori\t{}, {}, {}", rd, rs1, imm));
    }

    pub fn slt(&mut self, rd: &str, rs1: &str, rs2: &str) {
        self.line(&format!("slt\t{}, {}, {}", rd, rs1, rs2));
    }

    pub fn seqz(&mut self, rd: &str, rs: &str) {
        self.line(&format!("seqz\t{}, {}", rd, rs));
    }

    pub fn snez(&mut self, rd: &str, rs: &str) {
        self.line(&format!("snez\t{}, {}", rd, rs));
    }

    pub fn sll(&mut self, rd: &str, rs1: &str, shamt: u32) {
        self.line(&format!("slli\t{}, {}, {}", rd, rs1, shamt));
    }

    pub fn ret(&mut self) {
        self.line("ret");
    }

    pub fn call(&mut self, name: &str) {
        self.line(&format!("call\t{}", name));
    }

    pub fn j(&mut self, label: &str) {
        self.line(&format!("j\t{}", label));
    }

    /// `addi rd, rs1, imm`, synthesizing a safe large-immediate form when
    /// `imm` doesn't fit the 12-bit signed range. Uses the dedicated
    /// scratch register, so it's safe even when `rd == rs1`.
    pub fn addi(&mut self, rd: &str, rs1: &str, imm: i32) {
        if fits_imm12(imm) {
            self.line(&format!("addi\t{}, {}, {}", rd, rs1, imm));
        } else {
            self.li(SCRATCH, imm);
            self.add(rd, rs1, SCRATCH);
        }
    }

    /// `sw rs2, imm(rs1)`, synthesizing the large-immediate form via the
    /// scratch register when needed.
    pub fn sw(&mut self, rs2: &str, imm: i32, rs1: &str) {
        if fits_imm12(imm) {
            self.line(&format!("sw\t{}, {}({})", rs2, imm, rs1));
        } else {
            self.li(SCRATCH, imm);
            self.add(SCRATCH, rs1, SCRATCH);
            self.line(&format!("sw\t{}, 0({})", rs2, SCRATCH));
        }
    }

    /// `lw rd, imm(rs1)`, synthesizing the large-immediate form via the
    /// scratch register when needed.
    pub fn lw(&mut self, rd: &str, imm: i32, rs1: &str) {
        if fits_imm12(imm) {
            self.line(&format!("lw\t{}, {}({})", rd, imm, rs1));
        } else {
            self.li(SCRATCH, imm);
            self.add(SCRATCH, rs1, SCRATCH);
            self.line(&format!("lw\t{}, 0({})", rd, SCRATCH));
        }
    }

    /// The long-branch trick (spec §4.5): `bnez` only reaches a 12-bit
    /// signed offset, so a branch whose target may be more than ~2KiB away
    /// is split into a guaranteed-short `bnez`/`j` pair around an
    /// unconditional `j` to the real target, exactly as the original
    /// `gen_bnez` does.
    pub fn safe_bnez(&mut self, rs: &str, target: &str) {
        let id = self.temp_label_id;
        self.temp_label_id += 1;
        let tmp = format!("temp_label_{}", id);
        let after = format!("after_{}", tmp);
        self.line(&format!("bnez\t{}, {}", rs, tmp));
        self.j(&after);
        self.label(&tmp);
        self.j(target);
        self.label(&after);
    }
}

impl Default for InstWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_offset_uses_plain_addi() {
        let mut w = InstWriter::new();
        w.addi("sp", "sp", -64);
        assert_eq!(w.out, "\taddi\tsp, sp, -64\n");
    }

    #[test]
    fn large_offset_synthesizes_through_scratch() {
        let mut w = InstWriter::new();
        w.addi("t0", "sp", 5000);
        assert!(w.out.contains("li\tt6, 5000"));
        assert!(w.out.contains("add\tt0, sp, t6"));
    }

    #[test]
    fn safe_bnez_never_uses_a_branch_for_the_long_jump() {
        let mut w = InstWriter::new();
        w.safe_bnez("t0", "%while_body_3");
        assert!(w.out.contains("bnez\tt0, temp_label_0"));
        assert!(w.out.contains("j\t%while_body_3"));
        assert!(w.out.contains("after_temp_label_0:"));
    }
}
