use super::{PersistenceError, PersistenceResult, PlannerStore};
use crate::calendar::IsoWeek;
use crate::migrate;
use crate::model::{CellKey, DAYS_PER_WEEK, Document, SLOTS_PER_DAY};
use crate::store::get_entry;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const WEEKDAY_LABELS: [&str; DAYS_PER_WEEK as usize] = ["Mo", "Di", "Mi", "Do", "Fr"];

/// One `<key>.json` file per key inside a directory.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new<P: AsRef<Path>>(root: P) -> PersistenceResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PersistenceResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid || key.starts_with('.') {
            return Err(PersistenceError::InvalidData(format!(
                "unsupported storage key '{key}'"
            )));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl PlannerStore for DirectoryStore {
    fn read(&self, key: &str) -> PersistenceResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> PersistenceResult<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> PersistenceResult<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Write the whole document as pretty-printed JSON.
pub fn export_document_json<P: AsRef<Path>>(doc: &Document, path: P) -> PersistenceResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, doc)?;
    Ok(())
}

/// Read an export file. Anything that parses as JSON is normalized; text that
/// is not JSON at all is rejected.
pub fn import_document_json<P: AsRef<Path>>(path: P) -> PersistenceResult<Document> {
    let text = fs::read_to_string(path)?;
    let value = migrate::parse_json(&text)
        .ok_or_else(|| PersistenceError::InvalidData("file is not a JSON document".to_string()))?;
    Ok(migrate::normalize(&value))
}

/// Tabular view of one week: a row per block, a column per weekday.
pub fn write_week_csv<W: Write>(
    doc: &Document,
    plan_id: &str,
    iso: IsoWeek,
    writer: W,
) -> PersistenceResult<()> {
    let plan = doc
        .plans
        .get(plan_id)
        .ok_or_else(|| PersistenceError::NotFound(plan_id.to_string()))?;
    let week = plan.weeks.get(&iso.key()).cloned().unwrap_or_default();
    let dates = iso.dates();

    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec![iso.key()];
    for (label, date) in WEEKDAY_LABELS.iter().zip(dates.days) {
        header.push(format!("{label} {}", date.format("%d.%m.")));
    }
    wtr.write_record(&header)?;

    for slot in 0..SLOTS_PER_DAY {
        let mut row = vec![doc.settings.slot_labels[usize::from(slot)].clone()];
        for day in 1..=DAYS_PER_WEEK {
            let text = CellKey::new(day, slot)
                .map(|key| doc.entry_text(&get_entry(&week, key)))
                .unwrap_or_default();
            row.push(text);
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_week_csv<P: AsRef<Path>>(
    doc: &Document,
    plan_id: &str,
    iso: IsoWeek,
    path: P,
) -> PersistenceResult<()> {
    let file = File::create(path)?;
    write_week_csv(doc, plan_id, iso, file)
}
