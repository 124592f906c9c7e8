use std::{env, process::ExitCode};

use yamlet::{load_file, Options};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(file_path) = args.get(1) else {
        eprintln!("usage: yamlet <file.yaml>");
        return ExitCode::FAILURE;
    };

    let doc = match load_file(file_path, Options::default()) {
        Ok(doc) => doc,
        Err(err) => {
            eprintln!("error loading {file_path}:\n{err}");
            return ExitCode::FAILURE;
        }
    };

    match doc.root().evaluate_fully() {
        Ok(value) => {
            println!("{value:#?}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error evaluating {file_path}:\n{err}");
            ExitCode::FAILURE
        }
    }
}
