use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crate::storage::DbStats;

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Table")]
    table: &'static str,
    #[tabled(rename = "Rows")]
    rows: String,
}

/// Row counts per table, counts right-aligned
pub fn stats_table(stats: &DbStats) -> String {
    let rows: Vec<StatRow> = stats
        .rows()
        .into_iter()
        .map(|(table, rows)| StatRow { table, rows })
        .collect();
    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;

    #[test]
    fn test_stats_table_counts_seeded_store() {
        let store = Store::open_in_memory().unwrap();
        let stats = store.stats().unwrap();
        let table = stats_table(&stats);
        assert!(table.contains("Association types"));
        assert!(table.contains("Owners"));
        assert!(table.contains(&stats.association_types.to_string()));
        assert_eq!(table.lines().filter(|l| l.contains("│")).count(), stats.rows().len() + 1);
    }
}
