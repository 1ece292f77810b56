// Writes pipeboard.1 and one page per subcommand into the given directory (default: man/)

use std::fs;
use std::path::PathBuf;

use clap::CommandFactory;
use clap_mangen::Man;
use pipeboard::cli::Cli;

fn main() -> std::io::Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    fs::create_dir_all(&out_dir)?;

    let cmd = Cli::command();
    let mut buffer = Vec::new();
    Man::new(cmd.clone()).render(&mut buffer)?;
    fs::write(out_dir.join("pipeboard.1"), buffer)?;

    for sub in cmd.get_subcommands() {
        let name = format!("pipeboard-{}", sub.get_name());
        let mut buffer = Vec::new();
        Man::new(sub.clone()).title(name.clone()).render(&mut buffer)?;
        fs::write(out_dir.join(format!("{}.1", name)), buffer)?;
    }

    println!("Wrote man pages to {}", out_dir.display());
    Ok(())
}
