use std::path::Path;

use bolero::check;

use dbfutil::convert;
use dbfutil::field::Value;
use dbfutil::table::Table;

fn main() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("roundtrip.dbf");

    check!().with_type().for_each(|input: &(i32, u64, bool)| {
        let (id, raw, flag) = *input;

        let values = vec![
            Value::Integer(id),
            Value::Character(format!("n{}", raw % 100_000_000)),
            Value::Currency(convert::currency_to_string(raw % 1_000_000_000)),
            Value::Logical(Some(flag)),
            Value::Timestamp {
                days: id,
                ms: (raw % 86_400_000) as u32,
            },
            Value::Memo(format!("memo body {raw}")),
        ];

        write_table(&path, &values).expect("Failed to write table");
        read_back(&path, &values).expect("Failed to read table");
    });
}

fn write_table(path: &Path, values: &[Value]) -> anyhow::Result<()> {
    let mut table = Table::create(path)?;

    table.add_column("ID", b'I', None, None)?;
    table.add_column("NAME", b'C', Some(10), None)?;
    table.add_column("PRICE", b'Y', None, None)?;
    table.add_column("FLAG", b'L', None, None)?;
    table.add_column("AT", b'T', None, None)?;
    table.add_column("NOTE", b'M', None, None)?;

    table.insert(values)?;
    table.close()?;
    Ok(())
}

fn read_back(path: &Path, expected: &[Value]) -> anyhow::Result<()> {
    let mut table = Table::open(path)?;

    assert_eq!(table.record_count(), 1);
    assert_eq!(table.get_data_count()?, 1);

    let kinds: Vec<u8> = table.fields().iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![b'I', b'C', b'Y', b'L', b'T', b'M']);

    let rows = table.get_all_data()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], expected, "row differs after reopen");

    table.close()?;
    Ok(())
}
