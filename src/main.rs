use clap::Parser;

use dbfutil::config::Config;
use dbfutil::table::Table;

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    let mut table = Table::open(&config.table)?;

    println!("{table}");

    if config.schema || config.count {
        if config.schema {
            for field in table.fields() {
                println!("  {field}");
            }
        }
        if config.count {
            println!("live records: {}", table.get_data_count()?);
        }
        table.close()?;
        return Ok(());
    }

    table.for_each(|row| {
        let cells = row
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!("{cells}");
    })?;

    table.close()?;
    Ok(())
}
