//! Interactive command-line client over any registered adapter.

use std::io::{self, BufRead, Write};
use std::time::Instant;

use crate::db::Row;
use crate::properties::{self, Properties};
use crate::Result;

const HELP: &str = "Commands
  read key [field1 field2 ...] - Read a record
  scan key recordcount [field1 field2 ...] - Scan starting at key
  insert key name1=value1 [name2=value2 ...] - Insert a new record
  update key name1=value1 [name2=value2 ...] - Update a record
  delete key - Delete a record
  table [tablename] - Get or [set] the name of the table
  quit - Quit";

fn parse_values(parts: &[&str]) -> Option<Row> {
    let mut values = Row::new();
    for part in parts {
        let (name, value) = part.split_once('=')?;
        values.insert(name.to_string(), value.as_bytes().to_vec());
    }
    Some(values)
}

fn print_row(row: &Row) {
    let mut fields: Vec<_> = row.keys().collect();
    fields.sort();
    for f in fields {
        println!("{}={}", f, String::from_utf8_lossy(&row[f]));
    }
}

/// Run the interactive shell until `quit` or end of input.
pub fn run(db_name: &str, props: &Properties) -> Result<()> {
    println!("kvbench command line client");
    println!("Type \"help\" for command line help");

    let mut db = crate::adapters::create_adapter(db_name, props)?;
    db.init()?;
    println!("Connected.");

    let mut table = props
        .get_default(properties::PROP_TABLE_NAME, properties::PROP_TABLE_NAME_DEFAULT)
        .to_string();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        let start = Instant::now();
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => continue,
            ["help"] => {
                println!("{}", HELP);
                continue;
            }
            ["quit"] => break,
            ["table"] => println!("Using table \"{}\"", table),
            ["table", name] => {
                table = name.to_string();
                println!("Using table \"{}\"", table);
            }
            ["read"] => eprintln!("Error: syntax is \"read keyname [field1 field2 ...]\""),
            ["read", key, fields @ ..] => {
                let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
                let (row, status) = db.read(&table, key, &fields);
                println!("Return code: {}", status);
                print_row(&row);
            }
            ["scan", key, count, fields @ ..] => match count.parse::<i64>() {
                Ok(count) => {
                    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
                    let (rows, status) = db.scan(&table, key, count, &fields);
                    println!("Return code: {}", status);
                    if rows.is_empty() {
                        println!("0 records");
                    } else {
                        println!("--------------------------------");
                        for (i, row) in rows.iter().enumerate() {
                            println!("Record {}", i);
                            print_row(row);
                            println!("--------------------------------");
                        }
                    }
                }
                Err(_) => eprintln!("invalid scanlength: {}", count),
            },
            ["scan", ..] => {
                eprintln!("Error: syntax is \"scan keyname scanlength [field1 field2 ...]\"")
            }
            ["update", key, pairs @ ..] if !pairs.is_empty() => match parse_values(pairs) {
                Some(values) => {
                    let status = db.update(&table, key, &values);
                    println!("Result: {}", status);
                }
                None => eprintln!("Error: invalid name=value pair"),
            },
            ["update", ..] => {
                eprintln!("Error: syntax is \"update keyname name1=value1 [name2=value2 ...]\"")
            }
            ["insert", key, pairs @ ..] if !pairs.is_empty() => match parse_values(pairs) {
                Some(values) => {
                    let status = db.insert(&table, key, &values);
                    println!("Result: {}", status);
                }
                None => eprintln!("Error: invalid name=value pair"),
            },
            ["insert", ..] => {
                eprintln!("Error: syntax is \"insert keyname name1=value1 [name2=value2 ...]\"")
            }
            ["delete", key] => {
                let status = db.delete(&table, key);
                println!("Result: {}", status);
            }
            ["delete", ..] => eprintln!("Error: syntax is \"delete keyname\""),
            [cmd, ..] => eprintln!("Error: unknown command \"{}\"", cmd),
        }
        println!("{} ms", start.elapsed().as_millis());
    }
    db.cleanup()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_parse_as_pairs() {
        let values = parse_values(&["a=1", "b=two"]).unwrap();
        assert_eq!(values["a"], b"1");
        assert_eq!(values["b"], b"two");
    }

    #[test]
    fn values_reject_missing_equals() {
        assert!(parse_values(&["a=1", "broken"]).is_none());
    }
}
