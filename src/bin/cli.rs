#![cfg(not(tarpaulin_include))]

//! Run the table pipeline over a JSON export from the command line.
//!
//! ```text
//! cli <records.json> [--search TEXT] [--fields a,b.c] [--category-field F --category V]
//!     [--sort FIELD] [--desc] [--page N] [--size N]
//! ```
//!
//! Prints the resulting page as JSON.

use dekanat::listview::{DEFAULT_PAGE_SIZE, ListView, SortDirection};
use std::env;
use std::fs;
use std::process;

#[derive(Debug)]
struct Args {
    input: String,
    search: String,
    fields: Vec<String>,
    category_field: Option<String>,
    category: Option<String>,
    sort: String,
    direction: SortDirection,
    page: usize,
    size: usize,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} <records.json> [--search TEXT] [--fields a,b] \
         [--category-field F --category V] [--sort FIELD] [--desc] [--page N] [--size N]"
    )
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let program = raw.first().map(String::as_str).unwrap_or("cli");
    let mut rest = raw.iter().skip(1);
    let input = rest.next().ok_or_else(|| usage(program))?.clone();

    let mut args = Args {
        input,
        search: String::new(),
        fields: Vec::new(),
        category_field: None,
        category: None,
        sort: "id".to_string(),
        direction: SortDirection::Ascending,
        page: 0,
        size: DEFAULT_PAGE_SIZE,
    };

    while let Some(flag) = rest.next() {
        if flag == "--desc" {
            args.direction = SortDirection::Descending;
            continue;
        }
        let value = rest
            .next()
            .ok_or_else(|| format!("Missing value for {flag}"))?
            .clone();
        match flag.as_str() {
            "--search" => args.search = value,
            "--fields" => args.fields = value.split(',').map(str::to_string).collect(),
            "--category-field" => args.category_field = Some(value),
            "--category" => args.category = Some(value),
            "--sort" => args.sort = value,
            "--page" => args.page = value.parse().map_err(|e| format!("Bad --page: {e}"))?,
            "--size" => args.size = value.parse().map_err(|e| format!("Bad --size: {e}"))?,
            other => return Err(format!("Unknown flag {other}\n{}", usage(program))),
        }
    }

    if args.fields.is_empty() {
        args.fields.push(args.sort.clone());
    }
    Ok(args)
}

fn run(args: Args) -> Result<String, Box<dyn std::error::Error>> {
    let data = fs::read_to_string(&args.input)?;
    let records: Vec<serde_json::Value> = serde_json::from_str(&data)?;

    let mut view: ListView<serde_json::Value> = ListView::new(args.sort.as_str());
    for field in &args.fields {
        view = view.search(field.as_str());
    }
    if let Some(field) = &args.category_field {
        view = view.category(field.as_str());
    }

    let mut state = view.initial_state(args.size);
    state.set_search(args.search);
    state.set_category(args.category);
    state.set_sort(args.sort.as_str(), args.direction);
    state.set_page(args.page);

    let page = view.run(&records, &state);
    Ok(serde_json::to_string_pretty(&page)?)
}

fn main() {
    let raw: Vec<String> = env::args().collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            process::exit(2);
        }
    };

    match run(args) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
