use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use clap::Parser;
use tomb_hash::HashTable;
use tomb_hash::hash_table::Entry;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Remove-then-insert rounds run after the initial fill.
    #[arg(short = 'r', long = "churn_rounds", default_value_t = 4)]
    churn_rounds: usize,
}

fn hash_u64(value: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    let mut table: HashTable<u64> = HashTable::with_capacity(args.target_capacity);
    let hasher = |v: &u64| hash_u64(*v);

    println!("Actual capacity: {}", table.capacity());
    println!("Filling table with u64 values...");

    let num_values = args.target_capacity as u64;
    for value in 0..num_values {
        match table.entry(hash_u64(value), |&v| v == value) {
            Entry::Vacant(entry) => {
                entry.insert(value, hasher);
            }
            Entry::Occupied(_) => {
                panic!("Value already exists in table: {}", value);
            }
        }
    }

    println!("Inserted {} values into table", table.len());
    println!(
        "Load factor: {:.2}%",
        (table.len() as f64 / table.capacity() as f64) * 100.0
    );
    table.probe_histogram(hasher).print();

    // Each round retires the oldest half of the keys and inserts as many new
    // ones, leaving tombstones for the new keys to reclaim.
    let mut next = num_values;
    let mut oldest = 0;
    for round in 0..args.churn_rounds {
        for value in oldest..oldest + num_values / 2 {
            table.remove(hash_u64(value), |&v| v == value, hasher);
        }
        oldest += num_values / 2;

        let tombstones = table.deleted_count();
        for value in next..next + num_values / 2 {
            table.add(hash_u64(value), |&v| v == value, || value, hasher);
        }
        next += num_values / 2;

        println!(
            "round {}: {} live, {} tombstones before refill, {} after, capacity {}",
            round + 1,
            table.len(),
            tombstones,
            table.deleted_count(),
            table.capacity()
        );
    }

    table.check_consistency(hasher);
    table.probe_histogram(hasher).print();
    table.stats().print();
}
