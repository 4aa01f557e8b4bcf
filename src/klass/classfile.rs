//! Parsing of the compact binary class format.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! u32  magic (0xCAFED00D)
//! u16  version
//! u16  name length, then UTF-8 name bytes
//! u8   has_super, then u32 super class id if nonzero
//! u16  number of reference fields
//! u16  method count, then methods
//! ```
//!
//! Each method is a name (u16 length + bytes), u16 modifiers, bytecode
//! (u32 length + bytes) and a u16-counted attribute list. Attributes are
//! named blobs (u16 name length + bytes, u32 payload length + payload). The
//! only attribute understood here is `LineNumberTable`: a u16 count of
//! (u16 bytecode index, u16 line) pairs.
//!
//! Unknown attributes are ignored in classfiles older than
//! [`STRICT_ATTRIBUTE_VERSION`] and rejected from that version on.

use super::metadata::{ClassId, MethodModifiers};
use super::RedefineError;
use crate::util::constants::STRICT_ATTRIBUTE_VERSION;

pub const CLASS_MAGIC: u32 = 0xCAFE_D00D;

pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";

/// A structurally validated classfile, not yet installed in the table.
#[derive(Debug, Clone)]
pub struct ParsedClass {
    pub version: u16,
    pub name: String,
    pub super_class: Option<ClassId>,
    pub num_ref_fields: u16,
    pub methods: Vec<ParsedMethod>,
}

#[derive(Debug, Clone)]
pub struct ParsedMethod {
    pub name: String,
    pub modifiers: MethodModifiers,
    pub bytecode: Vec<u8>,
    pub line_table: Vec<(u16, u16)>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], RedefineError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                RedefineError::ClassFormat(format!(
                    "truncated at offset {} (wanted {} bytes of {})",
                    self.pos,
                    n,
                    self.bytes.len()
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, RedefineError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, RedefineError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, RedefineError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn utf8(&mut self, what: &str) -> Result<String, RedefineError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| RedefineError::ClassFormat(format!("{} is not valid UTF-8", what)))
    }

    fn done(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

/// Parse and structurally validate class bytes.
pub fn parse(bytes: &[u8]) -> Result<ParsedClass, RedefineError> {
    let mut r = Reader::new(bytes);

    let magic = r.u32()?;
    if magic != CLASS_MAGIC {
        return Err(RedefineError::ClassFormat(format!(
            "bad magic 0x{:08X}",
            magic
        )));
    }
    let version = r.u16()?;
    let name = r.utf8("class name")?;
    if name.is_empty() {
        return Err(RedefineError::ClassFormat("empty class name".to_owned()));
    }
    let super_class = if r.u8()? != 0 {
        Some(ClassId(r.u32()?))
    } else {
        None
    };
    let num_ref_fields = r.u16()?;

    let method_count = r.u16()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(parse_method(&mut r, version, &name)?);
    }
    if !r.done() {
        return Err(RedefineError::ClassFormat(format!(
            "{} trailing bytes after the last method",
            bytes.len() - r.pos
        )));
    }

    Ok(ParsedClass {
        version,
        name,
        super_class,
        num_ref_fields,
        methods,
    })
}

fn parse_method(
    r: &mut Reader,
    version: u16,
    class_name: &str,
) -> Result<ParsedMethod, RedefineError> {
    let name = r.utf8("method name")?;
    if name.is_empty() {
        return Err(RedefineError::ClassFormat("empty method name".to_owned()));
    }
    let modifiers = MethodModifiers(r.u16()?);
    let code_len = r.u32()? as usize;
    let bytecode = r.take(code_len)?.to_vec();

    let mut line_table = Vec::new();
    let attr_count = r.u16()?;
    for _ in 0..attr_count {
        let attr_name = r.utf8("attribute name")?;
        let payload_len = r.u32()? as usize;
        let payload = r.take(payload_len)?;
        if attr_name == LINE_NUMBER_TABLE {
            line_table = parse_line_table(payload)?;
        } else if version >= STRICT_ATTRIBUTE_VERSION {
            return Err(RedefineError::MalformedAttribute(format!(
                "unknown attribute '{}' on {}.{} (classfile version {})",
                attr_name, class_name, name, version
            )));
        } else {
            // Older classfiles may carry attributes from newer toolchains.
            warn!(
                "ignoring unknown attribute '{}' on {}.{} (classfile version {})",
                attr_name, class_name, name, version
            );
        }
    }

    Ok(ParsedMethod {
        name,
        modifiers,
        bytecode,
        line_table,
    })
}

fn parse_line_table(payload: &[u8]) -> Result<Vec<(u16, u16)>, RedefineError> {
    let mut r = Reader::new(payload);
    let count = r.u16()? as usize;
    let mut table = Vec::with_capacity(count);
    let mut last_bci = None;
    for _ in 0..count {
        let bci = r.u16()?;
        let line = r.u16()?;
        if last_bci.is_some_and(|last| bci <= last) {
            return Err(RedefineError::ClassFormat(
                "line number table is not sorted by bytecode index".to_owned(),
            ));
        }
        last_bci = Some(bci);
        table.push((bci, line));
    }
    if !r.done() {
        return Err(RedefineError::ClassFormat(
            "trailing bytes in line number table".to_owned(),
        ));
    }
    Ok(table)
}

pub mod testing {
    //! Builders for classfile bytes, used by unit and integration tests.
    use super::*;

    pub struct ClassBytesBuilder {
        version: u16,
        name: String,
        super_class: Option<ClassId>,
        num_ref_fields: u16,
        methods: Vec<Vec<u8>>,
    }

    impl ClassBytesBuilder {
        pub fn new(name: &str) -> Self {
            ClassBytesBuilder {
                version: 51,
                name: name.to_owned(),
                super_class: None,
                num_ref_fields: 0,
                methods: vec![],
            }
        }

        pub fn version(mut self, version: u16) -> Self {
            self.version = version;
            self
        }

        pub fn super_class(mut self, id: ClassId) -> Self {
            self.super_class = Some(id);
            self
        }

        pub fn ref_fields(mut self, n: u16) -> Self {
            self.num_ref_fields = n;
            self
        }

        pub fn method(self, name: &str, modifiers: u16, bytecode: &[u8]) -> Self {
            self.method_with_attrs(name, modifiers, bytecode, &[])
        }

        pub fn method_with_attrs(
            mut self,
            name: &str,
            modifiers: u16,
            bytecode: &[u8],
            attrs: &[(&str, Vec<u8>)],
        ) -> Self {
            let mut m = vec![];
            m.extend((name.len() as u16).to_be_bytes());
            m.extend(name.as_bytes());
            m.extend(modifiers.to_be_bytes());
            m.extend((bytecode.len() as u32).to_be_bytes());
            m.extend(bytecode);
            m.extend((attrs.len() as u16).to_be_bytes());
            for (attr_name, payload) in attrs {
                m.extend((attr_name.len() as u16).to_be_bytes());
                m.extend(attr_name.as_bytes());
                m.extend((payload.len() as u32).to_be_bytes());
                m.extend(payload);
            }
            self.methods.push(m);
            self
        }

        pub fn build(self) -> Vec<u8> {
            let mut b = vec![];
            b.extend(CLASS_MAGIC.to_be_bytes());
            b.extend(self.version.to_be_bytes());
            b.extend((self.name.len() as u16).to_be_bytes());
            b.extend(self.name.as_bytes());
            match self.super_class {
                Some(id) => {
                    b.push(1);
                    b.extend(id.0.to_be_bytes());
                }
                None => b.push(0),
            }
            b.extend(self.num_ref_fields.to_be_bytes());
            b.extend((self.methods.len() as u16).to_be_bytes());
            for m in self.methods {
                b.extend(m);
            }
            b
        }
    }

    pub fn line_table_payload(entries: &[(u16, u16)]) -> Vec<u8> {
        let mut p = vec![];
        p.extend((entries.len() as u16).to_be_bytes());
        for (bci, line) in entries {
            p.extend(bci.to_be_bytes());
            p.extend(line.to_be_bytes());
        }
        p
    }
}
