use clap::Parser;
use probe_table::HashTable;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Parser, Debug)]
struct Args {
    /// Number of random keys to insert.
    #[arg(short = 'n', long = "entries", default_value_t = 1000)]
    entries: usize,

    /// Initial number of cells.
    #[arg(short = 'c', long = "capacity", default_value_t = 0)]
    capacity: usize,

    /// Fraction of the inserted keys to delete before compacting.
    #[arg(short = 'd', long = "delete_fraction", default_value_t = 0.5)]
    delete_fraction: f64,

    /// Seed for the key generator.
    #[arg(short = 's', long = "seed", default_value_t = 0x5eed)]
    seed: u64,
}

fn main() {
    let args = Args::parse();
    let mut rng = SmallRng::seed_from_u64(args.seed);

    let mut table: HashTable<u64> = HashTable::with_capacity(args.capacity);
    println!("Initial capacity: {}", table.capacity());

    let mut keys = Vec::with_capacity(args.entries);
    for i in 0..args.entries {
        let key = rng.random::<u64>();
        if table.set(key, i as u64).is_none() {
            keys.push(key);
        }
    }

    println!("Inserted {} keys", table.len());
    println!(
        "Capacity after growth: {} ({:.2}% load factor)",
        table.capacity(),
        (table.len() as f64 / table.capacity() as f64) * 100.0
    );
    table.probe_histogram().print();
    table.debug_stats().print();

    let to_delete = (keys.len() as f64 * args.delete_fraction.clamp(0.0, 1.0)) as usize;
    for key in keys.iter().take(to_delete) {
        table.delete_key(*key);
    }
    println!();
    println!("Deleted {} keys with backward shifting", to_delete);
    table.probe_histogram().print();
    table.debug_stats().print();

    table.compact();
    println!();
    println!(
        "Compacted to {} cells ({:.2}% load factor)",
        table.capacity(),
        (table.len() as f64 / table.capacity() as f64) * 100.0
    );
    table.probe_histogram().print();
    table.debug_stats().print();
}
