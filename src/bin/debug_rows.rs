use invoice_highlighter::rows::build_document_rows;
use invoice_highlighter::{extract_keeper_name, extract_words, segment_line_items, Dialect};
use std::env;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: debug_rows <pdf_path> [page]");
        std::process::exit(1);
    }
    let only_page: Option<u32> = args.get(2).and_then(|s| s.parse().ok());

    let pages = match extract_words(&args[1]) {
        Ok(pages) => pages,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let dialect = Dialect::standard();
    let rows = build_document_rows(&pages, dialect.row_tolerance);

    let mut current_page = 0;
    for row in rows.iter().filter(|r| only_page.map_or(true, |p| r.page == p)) {
        if row.page != current_page {
            current_page = row.page;
            println!("=== PAGE {} ===", current_page);
        }
        let marker = if dialect.is_line_item_header(&row.text()) {
            "LI"
        } else if dialect.is_ac_header(&row.text()) {
            "AC"
        } else {
            "  "
        };
        let (x0, top) = row
            .words
            .first()
            .map(|w| (w.x0, w.top))
            .unwrap_or_default();
        println!("{} x={:7.1} top={:7.1} {:?}", marker, x0, top, row.text());
    }

    println!();
    println!("=== LINE ITEMS ===");
    for (i, item) in segment_line_items(&rows, &dialect).iter().enumerate() {
        let name = extract_keeper_name(item, &dialect);
        println!(
            "#{:3} pages={:?} keeper_rows={} ac_rows={} name={:?}{}",
            i + 1,
            item.pages,
            item.keeper_rows.len(),
            item.ac_rows.len(),
            name.key().as_str(),
            if name.degraded { " (fallback)" } else { "" }
        );
    }
}
