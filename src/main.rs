use quotient_set::log::init_logger;
use quotient_set::{FilterError, QuotientSet};

fn main() -> Result<(), FilterError> {
    init_logger();

    let mut seen: QuotientSet<&str> = QuotientSet::new();
    for word in ["to", "be", "or", "not", "to", "be"] {
        seen.insert(&word)?;
    }

    println!("to: {}", seen.contains(&"to"));
    println!("be: {}", seen.contains(&"be"));
    println!("question: {}", seen.contains(&"question"));

    seen.erase(&"not");
    println!("not (after erase): {}", seen.contains(&"not"));

    println!(
        "len = {}, slots = {}, load factor = {:.2}",
        seen.len(),
        seen.slot_count(),
        seen.load_factor()
    );
    Ok(())
}
