use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_backup-database");

/// Scratch layout for one run: fake dump utilities, HOME, logs and backups.
struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        for dir in ["bin", "home", "logs", "backups"] {
            fs::create_dir(root.path().join(dir)).expect("create fixture dir");
        }
        Fixture { root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    fn fake_utility(&self, name: &str, body: &str) {
        let script = self.path("bin").join(name);
        fs::write(&script, format!("#!/bin/sh\n{}\n", body)).expect("write fake utility");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod fake utility");
    }

    fn write_config(&self, databases: &str) -> PathBuf {
        let config = format!(
            "log_dir: {}\nbackup_dir: {}\ndatabases:\n{}",
            self.path("logs").display(),
            self.path("backups").display(),
            databases
        );
        let path = self.path("backup-database.yaml");
        fs::write(&path, config).expect("write config");
        path
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(BIN)
            .args(args)
            .current_dir(self.root.path())
            .env("PATH", format!("{}:/usr/bin:/bin", self.path("bin").display()))
            .env("HOME", self.path("home"))
            .env_remove("MY_ORG")
            .env_remove("RUST_LOG")
            .output()
            .expect("run backup-database")
    }

    fn backups(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(self.path("backups"))
            .expect("read backups")
            .map(|entry| entry.expect("dir entry").path())
            .collect();
        files.sort();
        files
    }

    fn log(&self, database: &str) -> String {
        fs::read_to_string(self.path("logs").join(format!("backup-database-{}.log", database)))
            .unwrap_or_default()
    }
}

const ORDERS: &str = r#"  - orders:
      db_type: mysql
      db_host: db1.example.com
      db_port: 3306
      db_name: orders
      db_user: backup
      db_password: s3cret
"#;

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[test]
fn mysql_backup_succeeds_and_secures_artifact() {
    let fx = Fixture::new();
    fx.fake_utility(
        "mysqldump",
        r#"case "$1" in
  --defaults-file=*) cnf="${1#--defaults-file=}" ;;
  *) echo "missing defaults file" >&2; exit 2 ;;
esac
while IFS= read -r line; do echo "-- $line"; done < "$cnf"
echo "-- args: $*""#,
    );
    let config = fx.write_config(ORDERS);

    let output = fx.run(&["--database", "orders", "--config", config.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let backups = fx.backups();
    assert_eq!(backups.len(), 1);
    let name = file_name(&backups[0]);
    assert!(name.starts_with("db-dump-orders-"), "{}", name);
    assert!(name.ends_with(".sql"), "{}", name);
    assert_eq!(name.len(), "db-dump-orders-".len() + "YYYY.MM.DD-HH.MM".len() + ".sql".len());

    let mode = fs::metadata(&backups[0]).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o660);

    let dump = fs::read_to_string(&backups[0]).unwrap();
    assert!(dump.contains("-- user=\"backup\""));
    assert!(dump.contains("-- password=\"s3cret\""));
    assert!(dump.contains("-h db1.example.com -P 3306 -v orders"));

    // Credential file only lives for the duration of the dump.
    assert!(!fx.path("home").join(".my.orders.cnf").exists());
    let log = fx.log("orders");
    assert!(log.contains("Beginning backup of database orders"));
    assert!(log.contains("Backup completed."));
}

#[test]
fn unknown_database_fails_without_artifact() {
    let fx = Fixture::new();
    fx.fake_utility("mysqldump", "echo dump");
    let config = fx.write_config(ORDERS);

    let output = fx.run(&["-d", "missing", "-c", config.to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Couldn't find configuration for database 'missing'"));
    assert!(fx.log("missing").contains("Couldn't find configuration for database 'missing'"));
    assert!(fx.backups().is_empty());
}

#[test]
fn failing_dump_logs_stderr_and_leaves_nothing() {
    let fx = Fixture::new();
    fx.fake_utility("mysqldump", "echo '-- partial'\necho 'connection refused' >&2\nexit 1");
    let config = fx.write_config(ORDERS);

    let output = fx.run(&["-d", "orders", "-c", config.to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("connection refused"));
    assert!(fx.log("orders").contains("connection refused"));
    assert!(fx.backups().is_empty());
    assert!(!fx.path("home").join(".my.orders.cnf").exists());
}

#[test]
fn postgres_password_travels_through_environment() {
    let fx = Fixture::new();
    fx.fake_utility("pg_dump", r#"echo "-- PGPASSWORD=$PGPASSWORD args: $*""#);
    let config = fx.write_config(
        r#"  - wiki:
      db_type: postgresql
      db_host: localhost
      db_port: "5432"
      db_name: wiki
      db_user: wikiuser
      db_password: redacted
"#,
    );

    let output = fx.run(&["-d", "wiki", "-c", config.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let backups = fx.backups();
    assert_eq!(backups.len(), 1);
    let dump = fs::read_to_string(&backups[0]).unwrap();
    assert_eq!(
        dump,
        "-- PGPASSWORD=redacted args: -U wikiuser -h localhost -p 5432 wiki\n"
    );
}

#[test]
fn missing_dump_utility_fails() {
    let fx = Fixture::new();
    let config = fx.write_config(
        r#"  - wiki:
      db_type: postgresql
      db_host: localhost
      db_port: 5432
      db_name: wiki
      db_user: wikiuser
      db_password: redacted
"#,
    );

    let output = Command::new(BIN)
        .args(["-d", "wiki", "-c", config.to_str().unwrap()])
        .current_dir(fx.root.path())
        .env("PATH", fx.path("bin"))
        .env_remove("RUST_LOG")
        .output()
        .expect("run backup-database");

    assert!(!output.status.success());
    assert!(stderr(&output).contains("pg_dump executable not found"));
    assert!(fx.backups().is_empty());
}

#[test]
fn no_config_source_fails() {
    let fx = Fixture::new();
    let output = fx.run(&["-d", "orders"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("MY_ORG"));
}

#[test]
fn unparsable_config_fails() {
    let fx = Fixture::new();
    let config = fx.path("broken.yaml");
    fs::write(&config, "log_dir: [unclosed").unwrap();

    let output = fx.run(&["-d", "orders", "-c", config.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Could not parse config file"));
}
