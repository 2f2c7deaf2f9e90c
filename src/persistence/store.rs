use crate::address::PublicIpRecord;
use log::{info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const TOMBSTONE_PREFIX: char = '#';

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no entry matching {needle} in {}", .path.display())]
    NotFound { needle: String, path: PathBuf },
}

/// Line-oriented file on the shared volume. The daemon reloads this file
/// positionally, so entries are never reordered: additions append and
/// removals either tombstone or drop a single line in place.
#[derive(Debug, Clone)]
pub struct SharedStore {
    path: PathBuf,
}

impl SharedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Creates the file empty if it is missing; existing content is untouched.
    pub fn touch(&self) -> Result<(), StoreError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map(|_| ())
            .map_err(|source| self.io_err(source))
    }

    /// Lines exactly as persisted. A missing file reads as empty.
    pub fn read(&self) -> Result<Vec<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(raw.lines().map(str::to_string).collect()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(self.io_err(err)),
        }
    }

    /// Appends one newline terminated line without reading the file. Only
    /// the final byte is inspected, so an externally edited file missing its
    /// trailing newline does not swallow the new entry.
    pub fn append(&self, line: &str) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_err(source))?;
        let needs_separator =
            ends_without_newline(&mut file).map_err(|source| self.io_err(source))?;
        let mut record = String::with_capacity(line.len() + 2);
        if needs_separator {
            record.push('\n');
        }
        record.push_str(line);
        record.push('\n');
        // A single write keeps concurrent appenders from interleaving
        // partial lines.
        file.write_all(record.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|source| self.io_err(source))?;
        info!(
            "event=store_append path={} line={line:?}",
            self.path.display()
        );
        Ok(())
    }

    /// Tombstones every active line equal to `ip` in place. A duplicate
    /// left active would keep the address listed after the delete.
    pub fn rewrite_tombstoning(&self, ip: &str) -> Result<(), StoreError> {
        let mut lines = self.read()?;
        let target = ip.parse::<IpAddr>().ok();
        let indices: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| {
                line.trim() == ip
                    || matches!(
                        (PrivateLine::parse(line), target),
                        (PrivateLine::Active(found), Some(target)) if found == target
                    )
            })
            .map(|(index, _)| index)
            .collect();
        if indices.is_empty() {
            return Err(self.not_found(ip));
        }
        for index in &indices {
            lines[*index] = format!("{TOMBSTONE_PREFIX}{ip}");
        }
        self.replace_all(&lines)?;
        info!(
            "event=store_tombstone path={} ip={ip} lines={indices:?}",
            self.path.display()
        );
        Ok(())
    }

    /// Drops the first line matching `predicate`, keeping the rest in order.
    pub fn rewrite_removing<F>(&self, describe: &str, predicate: F) -> Result<String, StoreError>
    where
        F: Fn(&str) -> bool,
    {
        let mut lines = self.read()?;
        let index = lines
            .iter()
            .position(|line| predicate(line))
            .ok_or_else(|| self.not_found(describe))?;
        let removed = lines.remove(index);
        self.replace_all(&lines)?;
        info!(
            "event=store_remove path={} removed={removed:?} line={index}",
            self.path.display()
        );
        Ok(removed)
    }

    /// Whole-file replacement through a sibling temp file and rename, so a
    /// reader never observes a truncated file and a failed write leaves the
    /// previous content in place.
    fn replace_all(&self, lines: &[String]) -> Result<(), StoreError> {
        let tmp = self.temp_path();
        let mut payload = String::new();
        for line in lines {
            payload.push_str(line);
            payload.push('\n');
        }
        let result = (|| {
            let mut file = File::create(&tmp)?;
            file.write_all(payload.as_bytes())?;
            file.sync_all()?;
            if let Ok(meta) = fs::metadata(&self.path) {
                fs::set_permissions(&tmp, meta.permissions())?;
            }
            fs::rename(&tmp, &self.path)
        })();
        if let Err(source) = result {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(
                        "event=store_tmp_cleanup_failed path={} error={cleanup}",
                        tmp.display()
                    );
                }
            }
            return Err(StoreError::Io {
                path: self.path.clone(),
                source,
            });
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn not_found(&self, needle: &str) -> StoreError {
        StoreError::NotFound {
            needle: needle.to_string(),
            path: self.path.clone(),
        }
    }
}

fn ends_without_newline(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// One line of the private store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivateLine {
    Active(IpAddr),
    Tombstone(IpAddr),
    Blank,
    Unparsed(String),
}

impl PrivateLine {
    pub fn parse(raw: &str) -> Self {
        let line = raw.trim();
        if line.is_empty() {
            return PrivateLine::Blank;
        }
        if let Some(rest) = line.strip_prefix(TOMBSTONE_PREFIX) {
            return match rest.trim().parse() {
                Ok(ip) => PrivateLine::Tombstone(ip),
                Err(_) => PrivateLine::Unparsed(raw.to_string()),
            };
        }
        match line.parse() {
            Ok(ip) => PrivateLine::Active(ip),
            Err(_) => PrivateLine::Unparsed(raw.to_string()),
        }
    }

    pub fn render_active(ip: &IpAddr) -> String {
        ip.to_string()
    }
}

/// Current private addresses. An address counts when its most recent
/// occurrence is active; results follow the file order of that occurrence.
pub fn active_private(lines: &[String]) -> Vec<IpAddr> {
    let mut active: Vec<IpAddr> = Vec::new();
    for line in lines {
        match PrivateLine::parse(line) {
            PrivateLine::Active(ip) => {
                active.retain(|existing| *existing != ip);
                active.push(ip);
            }
            PrivateLine::Tombstone(ip) => active.retain(|existing| *existing != ip),
            PrivateLine::Blank => {}
            PrivateLine::Unparsed(raw) => {
                warn!("event=private_store_unparsed line={raw:?}");
            }
        }
    }
    active
}

/// One line of the public store: `<ip>/<netmask> <interface>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicLine {
    pub ip: IpAddr,
    pub netmask: u8,
    pub interface: String,
}

impl PublicLine {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut fields = raw.split_whitespace();
        let cidr = fields.next()?;
        let interface = fields.next()?;
        if fields.next().is_some() {
            return None;
        }
        let (ip, netmask) = cidr.split_once('/')?;
        Some(Self {
            ip: ip.parse().ok()?,
            netmask: netmask.parse().ok()?,
            interface: interface.to_string(),
        })
    }

    pub fn render(&self) -> String {
        format!("{}/{} {}", self.ip, self.netmask, self.interface)
    }

    pub fn matches_ip(raw: &str, ip: &IpAddr) -> bool {
        Self::parse(raw).map(|line| line.ip == *ip).unwrap_or(false)
    }
}

pub fn public_records(lines: &[String]) -> Vec<PublicIpRecord> {
    lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match PublicLine::parse(line) {
            Some(parsed) => Some(PublicIpRecord {
                ip: parsed.ip,
                netmask: Some(parsed.netmask),
                interfaces: vec![parsed.interface],
                node: None,
            }),
            None => {
                warn!("event=public_store_unparsed line={line:?}");
                None
            }
        })
        .collect()
}
