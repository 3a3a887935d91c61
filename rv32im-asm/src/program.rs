use std::collections::{HashMap, HashSet};

use rv32im::table::AssembleContext;
use rv32im::{MachineCode, RelocationKind};

use crate::error::LabelError;

/// Which write cursor a label offset or relocation belongs to. Translated to
/// an absolute address by the linker (`§4.8`), which tells segments apart by
/// comparing against `CONST_BEGIN`/`STATIC_BEGIN`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Segment {
    Text,
    Rodata,
    Data,
}

/// One deferred patch: `kind` applied at `offset` within its segment once
/// `symbol`'s (address + `addend`) is known.
#[derive(Clone, Debug)]
pub struct RelocationEntry {
    pub offset: u32,
    pub kind: RelocationKind,
    pub symbol: String,
    pub addend: i64,
}

/// Pass one's output per instruction line, post pseudo-expansion: the exact
/// mnemonic + operand tokens pass two will hand to the instruction table.
#[derive(Clone, Debug)]
pub struct TalLine {
    pub line_no: u32,
    pub source: String,
    pub tokens: Vec<String>,
}

/// The assembler's output for one compilation unit, per `§3 Program`.
pub struct Program {
    pub insts: Vec<MachineCode>,
    pub labels: HashMap<String, i64>,
    pub equivs: HashMap<String, String>,
    pub global_labels: HashSet<String>,
    pub rodata_segment: Vec<u8>,
    pub data_segment: Vec<u8>,
    pub relocation_table: Vec<RelocationEntry>,
    pub rodata_relocation_table: Vec<RelocationEntry>,
    pub data_relocation_table: Vec<RelocationEntry>,
    pub debug_info: Vec<(u32, String)>,
    pub tal: Vec<TalLine>,
    pub text_size: u32,
    pub rodata_size: u32,
    pub data_size: u32,
    pub current_segment: Segment,
}

impl Default for Program {
    fn default() -> Program {
        Program {
            insts: Vec::new(),
            labels: HashMap::new(),
            equivs: HashMap::new(),
            global_labels: HashSet::new(),
            rodata_segment: Vec::new(),
            data_segment: Vec::new(),
            relocation_table: Vec::new(),
            rodata_relocation_table: Vec::new(),
            data_relocation_table: Vec::new(),
            debug_info: Vec::new(),
            tal: Vec::new(),
            text_size: 0,
            rodata_size: 0,
            data_size: 0,
            current_segment: Segment::Text,
        }
    }
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    /// The address a label declared *right now*, in the active segment,
    /// would receive. Text/rodata/data live in disjoint ranges so a single
    /// `i64` tags both the offset and which segment it belongs to.
    pub fn label_offset(&self) -> i64 {
        match self.current_segment {
            Segment::Text => i64::from(self.text_size),
            Segment::Rodata => i64::from(rv32im::CONST_BEGIN) + i64::from(self.rodata_size),
            Segment::Data => i64::from(rv32im::STATIC_BEGIN) + i64::from(self.data_size),
        }
    }

    pub fn add_label(&mut self, name: &str) -> Result<(), LabelError> {
        if self.labels.contains_key(name) {
            return Err(LabelError::DuplicateLocal(name.to_string()));
        }
        self.labels.insert(name.to_string(), self.label_offset());
        Ok(())
    }

    /// Appends one already-expanded instruction line to the TAL list and
    /// advances the text cursor, per `§4.3` step 6.
    pub fn push_tal(&mut self, line_no: u32, source: String, tokens: Vec<String>) {
        self.tal.push(TalLine { line_no, source, tokens });
        self.text_size += rv32im::INSTRUCTION_BYTES;
    }

    /// Requests a relocation at an explicit text offset, rather than the
    /// current one — used by pseudo-instruction expansion (`§4.4`) where the
    /// `PcRelLo` half of an `auipc`+X pair patches the *second* instruction.
    pub fn add_relocation_at(&mut self, offset: u32, kind: RelocationKind, symbol: String, addend: i64) {
        self.push_relocation(offset, kind, symbol, addend);
    }

    fn push_relocation(&mut self, offset: u32, kind: RelocationKind, symbol: String, addend: i64) {
        let entry = RelocationEntry { offset, kind, symbol, addend };
        match self.current_segment {
            Segment::Text => self.relocation_table.push(entry),
            Segment::Rodata => self.rodata_relocation_table.push(entry),
            Segment::Data => self.data_relocation_table.push(entry),
        }
    }
}

/// Pass two drives instruction parsers through this trait; `current_offset`
/// and `add_relocation` always refer to the text segment, since only text
/// lines go through the instruction table.
impl AssembleContext for Program {
    fn current_offset(&self) -> u32 {
        self.text_size
    }

    fn lookup_label(&self, symbol: &str) -> Option<i64> {
        self.labels.get(symbol).copied()
    }

    fn add_relocation(&mut self, kind: RelocationKind, symbol: String, addend: i64) {
        let offset = self.text_size;
        self.push_relocation(offset, kind, symbol, addend);
    }
}
