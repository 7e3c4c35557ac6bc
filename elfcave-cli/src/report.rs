use std::fmt;
use std::path::Path;

use anyhow::Result;
use elfcave_core::header::Header;
use elfcave_core::{ElfView, MappedBuffer};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Debug, Serialize)]
pub struct HeaderReport {
    pub elf_header: Location,
    pub program_header: Location,
    pub section_header: Location,
    pub program_header_count: u16,
    pub section_header_count: u16,
    pub entry_point: u64,
    pub object_type: &'static str,
    pub machine: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CaveReport {
    pub location: Location,
    pub size: usize,
}

/// A file offset and the address it occupies in the inspected buffer.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Location {
    pub offset: u64,
    pub address: usize,
}

impl Location {
    fn within(buffer: &MappedBuffer, offset: u64) -> Self {
        Self {
            offset,
            address: (buffer.as_ptr() as usize).wrapping_add(offset as usize),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} (at {:#x})", self.offset, self.address)
    }
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub path: String,
    pub origin: String,
    pub base_address: usize,
    pub size: usize,
    pub class: Option<String>,
    pub headers: Option<HeaderReport>,
    pub cave: Option<CaveReport>,
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

impl Report {
    pub fn new(path: &Path, buffer: &MappedBuffer) -> Self {
        Self {
            path: path.display().to_string(),
            origin: buffer.kind().to_string(),
            base_address: buffer.as_ptr() as usize,
            size: buffer.len(),
            class: None,
            headers: None,
            cave: None,
        }
    }

    pub fn record_headers(&mut self, view: &ElfView<'_>) {
        let buffer = view.buffer();
        let header = view.header();
        self.headers = Some(HeaderReport {
            elf_header: Location::within(buffer, view.elf_header_offset()),
            program_header: Location::within(buffer, view.program_header_offset()),
            section_header: Location::within(buffer, view.section_header_offset()),
            program_header_count: header.e_phnum,
            section_header_count: header.e_shnum,
            entry_point: header.entry_point(),
            object_type: header.type_name(),
            machine: header.machine_name(),
        });
    }

    pub fn record_cave(&mut self, buffer: &MappedBuffer, offset: usize, size: usize) {
        self.cave = Some(CaveReport {
            location: Location::within(buffer, offset as u64),
            size,
        });
    }

    pub fn print(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(self)?);
        } else {
            print!("{}", self);
        }
        Ok(())
    }

    fn rows(&self) -> Vec<Row> {
        let mut rows = vec![
            Row {
                field: "File",
                value: self.path.clone(),
            },
            Row {
                field: "Origin",
                value: format!("{} at {:#x}", self.origin, self.base_address),
            },
            Row {
                field: "Size",
                value: self.size.to_string(),
            },
        ];

        if let Some(class) = &self.class {
            rows.push(Row {
                field: "Class",
                value: class.clone(),
            });
        }

        if let Some(h) = &self.headers {
            rows.extend([
                Row {
                    field: "ELF header",
                    value: h.elf_header.to_string(),
                },
                Row {
                    field: "Program header",
                    value: format!("{} x{}", h.program_header, h.program_header_count),
                },
                Row {
                    field: "Section header",
                    value: format!("{} x{}", h.section_header, h.section_header_count),
                },
                Row {
                    field: "Entry point",
                    value: format!("{:#x}", h.entry_point),
                },
                Row {
                    field: "Type",
                    value: format!("{} ({})", h.object_type, h.machine),
                },
            ]);
        }

        if let Some(cave) = &self.cave {
            rows.extend([
                Row {
                    field: "Code cave",
                    value: cave.location.to_string(),
                },
                Row {
                    field: "Cave size",
                    value: cave.size.to_string(),
                },
            ]);
        }

        rows
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new(self.rows());
        table.with(Style::psql());
        writeln!(f, "{}", table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elfcave_core::AllocConfig;

    #[test]
    fn table_lists_cave() {
        let buffer = MappedBuffer::from_bytes(b"AB\0\0\0C", &AllocConfig::default()).unwrap();
        let mut report = Report::new(Path::new("blob.bin"), &buffer);
        report.record_cave(&buffer, 2, 3);

        let text = report.to_string();
        assert!(text.contains("blob.bin"));
        assert!(text.contains("heap"));
        assert!(text.contains("Code cave"));
        assert!(text.contains("0x2 (at "));
        assert!(!text.contains("Program header"));
    }

    #[test]
    fn json_has_null_headers_when_unresolved() {
        let buffer = MappedBuffer::from_bytes(b"\x7fELF\x01", &AllocConfig::default()).unwrap();
        let mut report = Report::new(Path::new("x"), &buffer);
        report.class = Some("ELF32".to_string());

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["class"], "ELF32");
        assert!(value["headers"].is_null());
        assert_eq!(value["size"], 5);
    }
}
