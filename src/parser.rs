//! Parser for Dependency-Check XML analysis reports.
//!
//! Report structure (elements we care about):
//!   <analysis>
//!     <dependencies>
//!       <dependency>
//!         <fileName>commons-collections-3.2.1.jar</fileName>
//!         <filePath>/workspace/lib/commons-collections-3.2.1.jar</filePath>
//!         <vulnerabilities>
//!           <vulnerability>
//!             <name>CVE-2015-6420</name>
//!             <severity>High</severity>
//!             <description>...</description>
//!           </vulnerability>
//!         </vulnerabilities>
//!       </dependency>
//!     </dependencies>
//!   </analysis>
//!
//! One `Warning` is emitted per vulnerability, in document order. The
//! identity key is `fileName:CVE-id`; the CVE id is extracted from the
//! vulnerability name, falling back to the whole name for non-CVE entries
//! (e.g. NSP or OSS Index identifiers).

use std::sync::LazyLock;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use regex::Regex;

use crate::error::{DepgateError, Result};
use crate::model::{Severity, Warning};

/// Pre-compiled regex for CVE identifiers like "CVE-2015-6420".
static CVE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"CVE-\d{4}-\d{4,}").unwrap());

/// Read and parse a report file.
pub fn parse_report_file(path: &std::path::Path) -> Result<Vec<Warning>> {
    let content = std::fs::read(path)?;
    parse_report(&content)
}

/// Parse a Dependency-Check report into the warning list, in report order.
/// A report with no vulnerabilities is a valid zero-finding result.
pub fn parse_report(input: &[u8]) -> Result<Vec<Warning>> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);

    let mut warnings = Vec::new();
    let mut buf = Vec::new();

    // State tracking
    let mut file_name = String::new();
    let mut file_path = String::new();
    let mut in_vulnerabilities = false;
    let mut in_related = false;
    let mut in_suppressed = false;
    let mut in_references = false;
    let mut vuln: Option<PendingVulnerability> = None;
    let mut text_target: Option<TextTarget> = None;
    let mut text = String::new();

    loop {
        let position = reader.buffer_position();
        match reader.read_event_into(&mut buf) {
            Err(source) => return Err(DepgateError::Xml { source, position }),
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) => {
                let name = e.name();
                match name.as_ref() {
                    b"dependency" => {
                        file_name.clear();
                        file_path.clear();
                    }
                    b"vulnerabilities" => in_vulnerabilities = true,
                    b"suppressedVulnerabilities" => in_suppressed = true,
                    b"relatedDependencies" => in_related = true,
                    b"vulnerability" if in_vulnerabilities && !in_suppressed => {
                        vuln = Some(PendingVulnerability::default());
                    }
                    // fileName/filePath also appear under relatedDependencies;
                    // only the dependency's own pair identifies the finding.
                    b"fileName" if !in_related && !in_vulnerabilities => {
                        text_target = Some(TextTarget::FileName);
                        text.clear();
                    }
                    b"filePath" if !in_related && !in_vulnerabilities => {
                        text_target = Some(TextTarget::FilePath);
                        text.clear();
                    }
                    // <references> entries carry their own <name> elements;
                    // they must not clobber the vulnerability name.
                    b"references" => in_references = true,
                    b"name" if vuln.is_some() && !in_references => {
                        text_target = Some(TextTarget::VulnName);
                        text.clear();
                    }
                    b"severity" if vuln.is_some() => {
                        text_target = Some(TextTarget::VulnSeverity);
                        text.clear();
                    }
                    b"description" if vuln.is_some() => {
                        text_target = Some(TextTarget::VulnDescription);
                        text.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref t)) => {
                if text_target.is_some() {
                    let unescaped = t
                        .unescape()
                        .map_err(|source| DepgateError::Xml { source, position })?;
                    text.push_str(&unescaped);
                }
            }
            Ok(Event::CData(ref t)) => {
                if text_target.is_some() {
                    text.push_str(&String::from_utf8_lossy(t));
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                match name.as_ref() {
                    b"vulnerabilities" => in_vulnerabilities = false,
                    b"suppressedVulnerabilities" => in_suppressed = false,
                    b"references" => in_references = false,
                    b"relatedDependencies" => in_related = false,
                    b"vulnerability" => {
                        if let Some(pending) = vuln.take() {
                            if let Some(warning) = pending.into_warning(&file_name, &file_path) {
                                warnings.push(warning);
                            }
                        }
                    }
                    _ => {
                        if let Some(target) = text_target.take() {
                            apply_text(
                                target,
                                std::mem::take(&mut text),
                                &mut file_name,
                                &mut file_path,
                                vuln.as_mut(),
                            );
                        }
                    }
                }
            }
            Ok(_) => {}
        }
        buf.clear();
    }

    Ok(warnings)
}

#[derive(Clone, Copy)]
enum TextTarget {
    FileName,
    FilePath,
    VulnName,
    VulnSeverity,
    VulnDescription,
}

fn apply_text(
    target: TextTarget,
    text: String,
    file_name: &mut String,
    file_path: &mut String,
    vuln: Option<&mut PendingVulnerability>,
) {
    match target {
        TextTarget::FileName => *file_name = text,
        TextTarget::FilePath => *file_path = text,
        TextTarget::VulnName => {
            if let Some(v) = vuln {
                v.name = text;
            }
        }
        TextTarget::VulnSeverity => {
            if let Some(v) = vuln {
                v.severity = text;
            }
        }
        TextTarget::VulnDescription => {
            if let Some(v) = vuln {
                v.description = text;
            }
        }
    }
}

#[derive(Default)]
struct PendingVulnerability {
    name: String,
    severity: String,
    description: String,
}

impl PendingVulnerability {
    /// Build the final warning. Vulnerabilities without a name are dropped:
    /// there is nothing stable to key them on.
    fn into_warning(self, file_name: &str, file_path: &str) -> Option<Warning> {
        if self.name.is_empty() {
            return None;
        }
        let message = if self.description.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.description)
        };
        let path = if file_path.is_empty() {
            file_name.to_string()
        } else {
            file_path.to_string()
        };
        Some(Warning {
            identity: identity_key(file_name, &self.name),
            message,
            severity: Severity::from_report(&self.severity),
            file_path: path,
        })
    }
}

/// Stable identity key for delta computation across builds: the dependency
/// file name plus the CVE id (or the full vulnerability name when no CVE id
/// is present).
fn identity_key(file_name: &str, vuln_name: &str) -> String {
    let key = CVE_RE
        .find(vuln_name)
        .map(|m| m.as_str())
        .unwrap_or(vuln_name);
    format!("{}:{}", file_name, key)
}
