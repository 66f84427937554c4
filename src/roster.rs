/*!
Student roster plumbing: the combined "ID - Name" selector used by the
data-entry forms, and bulk CSV import of students.
*/
use std::io::Read;

use crate::store::Record;

/// Split the combined `"ID - Name"` selector the entry forms submit.
/// Returns `None` unless both halves are present and non-empty.
pub fn split_student_selector(s: &str) -> Option<(String, String)> {
    let (id, name) = s.split_once(" - ")?;
    let id = id.trim();
    let name = name.trim();
    if id.is_empty() || name.is_empty() {
        return None;
    }
    Some((id.to_string(), name.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentRecord {
    pub student_id: String,
    pub name: String,
    pub class_name: String,
    pub parent_contact: String,
}

impl StudentRecord {
    /**
    Bulk-import rows look like this:

    ```csv
    #student_id, name,       class_name, parent_contact
    1023,        Ali Hassan, 5-A,        parent.hassan@example.com
    ```
    */
    pub fn from_csv_line(row: &csv::StringRecord) -> Result<StudentRecord, &'static str> {
        let student_id = match row.get(0) {
            Some(s) if !s.is_empty() => s.to_owned(),
            _ => return Err("no student_id"),
        };
        let name = match row.get(1) {
            Some(s) if !s.is_empty() => s.to_owned(),
            _ => return Err("no name"),
        };
        let class_name = match row.get(2) {
            Some(s) => s.to_owned(),
            None => return Err("no class_name"),
        };
        let parent_contact = match row.get(3) {
            Some(s) => s.to_owned(),
            None => return Err("no parent_contact"),
        };

        Ok(StudentRecord {
            student_id,
            name,
            class_name,
            parent_contact,
        })
    }

    pub fn vec_from_csv_reader<R: Read>(r: R) -> Result<Vec<StudentRecord>, String> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(false)
            .has_headers(false)
            .from_reader(r);

        let mut students: Vec<StudentRecord> = Vec::new();

        for (n, res) in csv_reader.records().enumerate() {
            match res {
                Ok(record) => match StudentRecord::from_csv_line(&record) {
                    Ok(stud) => students.push(stud),
                    Err(e) => {
                        let estr = match record.position() {
                            Some(p) => format!("Error on line {}: {}", p.line(), &e),
                            None => format!("Error in CSV record {}: {}", &n, &e),
                        };
                        return Err(estr);
                    }
                },
                Err(e) => {
                    let estr = match e.position() {
                        Some(p) => format!("Error on line {}: {}", p.line(), &e),
                        None => format!("Error in CSV record {}: {}", &n, &e),
                    };
                    return Err(estr);
                }
            }
        }

        Ok(students)
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("Student_ID".to_string(), self.student_id.clone().into());
        rec.insert("Name".to_string(), self.name.clone().into());
        rec.insert("Class_Name".to_string(), self.class_name.clone().into());
        rec.insert(
            "Parent_Contact".to_string(),
            self.parent_contact.clone().into(),
        );
        rec
    }
}
