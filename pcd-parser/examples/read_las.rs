use std::path::PathBuf;

use pcd_parser::LasPointReader;

fn main() {
    let Some(path) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("usage: read_las <FILE>");
        std::process::exit(2);
    };
    let mut reader = LasPointReader::from_path(&path).unwrap();

    println!(
        "LAS {version}, point layout {layout}, number of points: {num_points}",
        version = reader.header().version,
        layout = reader.layout().id,
        num_points = reader.len()
    );

    if let Some(record) = reader.next() {
        let record = record.unwrap();
        println!("First record: {:?}", record);
        println!("First point: {:?}", reader.to_point(&record));
    }
}
