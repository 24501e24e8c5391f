use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// One row of the class metadata file, aligned positionally with the model's
/// output indices.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassRecord {
    pub class_name: String,
    pub pesticide: String,
    pub shop: String,
}

#[derive(Debug)]
pub struct ClassTable {
    records: Vec<ClassRecord>,
}

impl ClassTable {
    pub fn load(filepath: &Path) -> io::Result<Self> {
        let file = File::open(filepath)?;
        Self::parse(io::BufReader::new(file))
    }

    #[cfg(test)]
    pub fn from_records(records: Vec<ClassRecord>) -> Self {
        Self { records }
    }

    /// Parses the comma-separated metadata file. The first line is a header
    /// row and is skipped; every data line must have exactly three fields
    /// (class name, pesticide, shop). Field values must not contain commas.
    fn parse<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut records = Vec::new();

        for (line_number, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line_number == 0 || line.trim().is_empty() {
                continue;
            }

            let parts: Vec<&str> = line.split(',').collect();
            if parts.len() != 3 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid line format: {}", line),
                ));
            }

            records.push(ClassRecord {
                class_name: parts[0].trim().to_string(),
                pesticide: parts[1].trim().to_string(),
                shop: parts[2].trim().to_string(),
            });
        }

        Ok(Self { records })
    }

    pub fn get(&self, index: usize) -> Option<&ClassRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
