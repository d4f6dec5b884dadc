/// colstore API demo
///
/// Loads a table, switches a mostly-default column between the plain and
/// sparsed accessors, and lets background indexation and compaction
/// rewrite the chunks while counts stay put.

use colstore::{BackgroundKind, ColumnType, Config, Database, Row, TableSchema, Value};
use colstore::AccessorConfig;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║   colstore - Accessor Switching Demo          ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    let config = Config::in_memory(4)
        .with_background_enabled(false)
        .with_wakeup_interval(Duration::from_millis(100));
    let db = Database::open(config)?;
    db.create_table(
        TableSchema::new("olapTable")
            .add_column("pk_int", ColumnType::Int64, false)
            .add_column("field", ColumnType::Utf8, true)
            .with_primary_key(&["pk_int"]),
    )?;

    println!("Step 1: UPSERT - 10000 rows, 90% default...");
    let rows: Vec<Row> = (0..10_000)
        .map(|i| {
            let field = if i % 10 == 0 { format!("value_{}", i) } else { "abcde".to_string() };
            Row::new().with("pk_int", Value::Int64(i)).with("field", Value::utf8(field))
        })
        .collect();
    db.upsert("olapTable", rows)?;
    report(&db, "buffered")?;

    println!("Step 2: INDEXATION - plain chunks...");
    db.enable_background(BackgroundKind::Indexation);
    db.wait_indexation(Duration::from_secs(5))?;
    report(&db, "indexed")?;

    println!("Step 3: ALTER - field to SPARSED, then compaction...");
    db.alter_column_accessor("olapTable", "field", AccessorConfig::sparsed(Value::utf8("abcde")))?;
    db.enable_background(BackgroundKind::Compaction);
    db.wait_compaction(Duration::from_secs(5))?;
    report(&db, "compacted")?;

    println!("Step 4: STATS");
    println!("{}", serde_json::to_string_pretty(&db.stats())?);
    Ok(())
}

fn report(db: &Database, stage: &str) -> Result<(), Box<dyn std::error::Error>> {
    let stats = db.column_stats("olapTable", "field")?;
    println!(
        "  [{}] rows={} defaults={} plain_chunks={} sparsed_chunks={} stored_values={} buffered={}\n",
        stage,
        db.count("olapTable")?,
        db.count_where_eq("olapTable", "field", Value::utf8("abcde"))?,
        stats.plain_chunks,
        stats.sparsed_chunks,
        stats.explicit_values,
        stats.buffered_rows,
    );
    Ok(())
}
