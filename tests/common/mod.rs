#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    /// Spawns the binary inside `cwd` so no stray `makeupd.toml` or `.env` is picked up.
    pub fn spawn(cwd: &Path) -> Self {
        Self::spawn_with_env(cwd, &[])
    }

    pub fn spawn_with_env(cwd: &Path, env: &[(&str, &str)]) -> Self {
        let exe = env!("CARGO_BIN_EXE_makeupd");
        let mut cmd = Command::new(exe);
        cmd.current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        for (k, _) in std::env::vars() {
            if k.starts_with("MAKEUPD") {
                cmd.env_remove(k);
            }
        }
        for (k, v) in env {
            cmd.env(k, v);
        }
        let mut child = cmd.spawn().expect("spawn makeupd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Sidecar {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn call(
        &mut self,
        method: &str,
        params: serde_json::Value,
        identity: Option<serde_json::Value>,
    ) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(who) = identity {
            payload["identity"] = who;
        }
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn call_ok(
        &mut self,
        method: &str,
        params: serde_json::Value,
        identity: Option<serde_json::Value>,
    ) -> serde_json::Value {
        let resp = self.call(method, params, identity);
        assert_eq!(resp["ok"], true, "{} failed: {}", method, resp);
        resp["result"].clone()
    }

    pub fn select_workspace(&mut self, workspace: &Path) {
        self.call_ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
            None,
        );
    }

    pub fn create_class(&mut self, subject: &str, date: &str) -> serde_json::Value {
        self.call_ok(
            "faculty.createClass",
            json!({
                "subject": subject,
                "classroom": "B-204",
                "date": date,
                "time": "10:00",
                "description": "revision",
            }),
            Some(staff()),
        )
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn staff() -> serde_json::Value {
    json!({ "username": "prof.rao", "staff": true, "name": "Dr. Rao" })
}

pub fn student(roll: &str) -> serde_json::Value {
    json!({ "username": roll, "name": format!("Student {}", roll) })
}

pub fn error_code(resp: &serde_json::Value) -> &str {
    resp["error"]["code"].as_str().unwrap_or("")
}

pub fn open_db(workspace: &Path) -> rusqlite::Connection {
    rusqlite::Connection::open(workspace.join("makeup.sqlite3")).expect("open sqlite")
}

pub fn count(conn: &rusqlite::Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |r| r.get(0)).expect("count")
}
