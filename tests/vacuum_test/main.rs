use std::path::Path;

use dbfutil::field::Value;
use dbfutil::table::Table;

fn main() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("orders.dbf");

    build_table(&path).expect("Failed to build table");
    delete_and_vacuum(&path).expect("Failed to vacuum");
    verify_compacted(&path).expect("Failed to verify vacuumed table");
    reuse_free_slot(&path).expect("Failed to verify free slot reuse");
}

fn record(id: f64, label: &str, note: &str) -> Vec<Value> {
    vec![
        Value::Numeric(Some(id)),
        Value::Character(label.into()),
        Value::Memo(note.into()),
    ]
}

fn build_table(path: &Path) -> anyhow::Result<()> {
    let mut table = Table::create(path)?;
    table.add_column("ID", b'N', Some(6), Some(0))?;
    table.add_column("LABEL", b'C', Some(12), None)?;
    table.add_column("NOTE", b'M', None, None)?;

    for id in 0..6 {
        table.insert(&record(id as f64, &format!("label{id}"), &format!("note for {id}")))?;
    }
    table.close()?;
    Ok(())
}

fn delete_and_vacuum(path: &Path) -> anyhow::Result<()> {
    let mut table = Table::open(path)?;
    assert_eq!(table.record_count(), 6);

    assert!(table.delete(1)?);
    assert!(table.delete(3)?);
    assert_eq!(table.get_data_count()?, 4);

    // Deleted records never come back through any read path.
    table.for_each(|row| {
        assert_ne!(row.get("LABEL"), Some(&Value::Character("label1".into())));
        assert_ne!(row.get("LABEL"), Some(&Value::Character("label4".into())));
    })?;

    table.vacuum()?;
    assert_eq!(table.record_count(), 4);
    assert_eq!(table.get_data_count()?, 4);
    table.close()?;

    assert!(!path.with_extension("vacuum.dbf").exists());
    assert!(!path.with_extension("vacuum.dbt").exists());
    Ok(())
}

fn verify_compacted(path: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(path)?;
    assert_eq!(*bytes.last().unwrap(), 0x1a, "missing EOF marker");
    assert!(!bytes.contains(&0x2a), "tombstone survived vacuum");

    let mut table = Table::open(path)?;
    assert_eq!(table.record_count(), 4);

    let rows = table.get_all_data()?;
    let labels: Vec<String> = rows.iter().map(|r| r[1].to_string()).collect();
    assert_eq!(labels, vec!["label0", "label2", "label3", "label5"]);

    // Memo bodies were carried into the fresh sidecar.
    assert_eq!(rows[1][2], Value::Memo("note for 2".into()));
    assert_eq!(rows[3][2], Value::Memo("note for 5".into()));

    table.close()?;
    Ok(())
}

fn reuse_free_slot(path: &Path) -> anyhow::Result<()> {
    let mut table = Table::open(path)?;

    assert!(table.delete(0)?);
    table.insert(&record(99.0, "fresh", "fresh note"))?;

    // The insert landed in the tombstone slot.
    let rows = table.get_all_data()?;
    assert_eq!(rows[0][1], Value::Character("fresh".into()));
    assert_eq!(rows[0][2], Value::Memo("fresh note".into()));

    table.close()?;

    let bytes = std::fs::read(path)?;
    assert_eq!(*bytes.last().unwrap(), 0x1a);
    Ok(())
}
