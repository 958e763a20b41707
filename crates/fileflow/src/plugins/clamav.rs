//! Virus scanning through a clamd daemon (`INSTREAM` over TCP).
//!
//! A detection does not fail the run: the file gets a `processing_errors`
//! entry and moves on. Connection and protocol failures are plugin errors.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::file::ManagedFile;
use crate::plugin::{NoParams, Plugin, PluginError};
use crate::status::FileProcess;

const CHUNK_SIZE: usize = 64 * 1024;

/// Result of scanning one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected(String),
}

pub struct ClamAv {
    address: String,
    timeout: Duration,
}

impl ClamAv {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    fn connect(&self) -> io::Result<TcpStream> {
        let addr = self
            .address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "clamd address did not resolve"))?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }

    pub fn ping(&self) -> io::Result<()> {
        let mut stream = self.connect()?;
        stream.write_all(b"zPING\0")?;
        let reply = read_reply(&mut stream)?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected PING reply: {}", reply),
            ))
        }
    }

    pub fn scan(&self, content: &[u8]) -> io::Result<ScanVerdict> {
        let mut stream = self.connect()?;
        stream.write_all(b"zINSTREAM\0")?;
        for chunk in content.chunks(CHUNK_SIZE) {
            stream.write_all(&(chunk.len() as u32).to_be_bytes())?;
            stream.write_all(chunk)?;
        }
        stream.write_all(&0u32.to_be_bytes())?;
        stream.flush()?;

        parse_scan_reply(&read_reply(&mut stream)?)
    }
}

/// Reads a NUL-terminated clamd reply.
fn read_reply(stream: &mut impl Read) -> io::Result<String> {
    let mut reply = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte)? {
            0 => break,
            _ if byte[0] == 0 => break,
            _ => reply.push(byte[0]),
        }
    }
    Ok(String::from_utf8_lossy(&reply).trim().to_string())
}

fn parse_scan_reply(reply: &str) -> io::Result<ScanVerdict> {
    let verdict = reply.strip_prefix("stream:").unwrap_or(reply).trim();
    if verdict == "OK" {
        Ok(ScanVerdict::Clean)
    } else if let Some(signature) = verdict.strip_suffix("FOUND") {
        Ok(ScanVerdict::Infected(signature.trim().to_string()))
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("clamd error: {}", verdict),
        ))
    }
}

impl Plugin for ClamAv {
    type Params = NoParams;

    fn name(&self) -> &str {
        "ClamAV"
    }

    fn process(
        &self,
        mut files: Vec<ManagedFile>,
        _params: &NoParams,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        for file in &mut files {
            super::report(
                process,
                self.name(),
                format!("Scanning file for viruses: {}", file.file_name),
            );

            let verdict = self
                .scan(file.load_content()?)
                .map_err(|e| PluginError::Failed(format!("failed to scan file: {}", e)))?;

            if let ScanVerdict::Infected(signature) = verdict {
                tracing::warn!(file = %file.file_name, signature = %signature, "Virus detected");
                file.processing_errors
                    .push(format!("virus detected: {}", signature));
            }
        }
        Ok(files)
    }
}
