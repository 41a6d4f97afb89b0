//! The request orchestrator: question in, answer set plus status out.

use loam_model::{DnsRecord, LookupQuery};
use loam_proto::{Message, Name, RData, Rcode, RecordType, ResourceRecord};
use loam_resolver::{Resolution, Resolver};
use loam_server::{QueryContext, QueryHandler, ServerStats};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Orchestrates one question: bounds it with the request deadline, runs the
/// resolver, and maps the outcome to a wire status.
pub struct AuthorityHandler {
    resolver: Arc<Resolver>,
    stats: Arc<ServerStats>,
    deadline: Duration,
    concurrency: Arc<Semaphore>,
}

impl AuthorityHandler {
    /// Creates the orchestrator.
    pub fn new(
        resolver: Arc<Resolver>,
        stats: Arc<ServerStats>,
        deadline: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            resolver,
            stats,
            deadline,
            concurrency: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Returns the orchestrator's statistics.
    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    async fn answer_question(&self, response: &mut Message, qname: &Name, qtype: RecordType) {
        self.stats.record_question(qtype);

        let lookup = LookupQuery::new(&qname.to_string(), qtype);
        let resolution = match timeout(self.deadline, self.resolver.resolve(&lookup)).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(e)) => {
                warn!(query = %lookup, error = %e, "resolution failed");
                self.stats.record_error();
                response.set_rcode(Rcode::ServFail);
                return;
            }
            Err(_) => {
                warn!(query = %lookup, deadline = ?self.deadline, "resolution deadline elapsed");
                self.stats.record_error();
                response.set_rcode(Rcode::ServFail);
                return;
            }
        };

        match resolution {
            Resolution::NotFound => {
                debug!(query = %lookup, "no records");
                self.stats.record_not_found();
                response.set_rcode(Rcode::NxDomain);
            }
            Resolution::Answered(records) => {
                let mut added = 0;
                for record in &records {
                    match to_resource_record(record, qtype) {
                        Ok(Some(rr)) => {
                            response.add_answer(rr);
                            added += 1;
                        }
                        Ok(None) => {}
                        Err(message) => {
                            warn!(query = %lookup, id = record.id, message, "bad stored record");
                            self.stats.record_error();
                            response.set_rcode(Rcode::ServFail);
                            return;
                        }
                    }
                }

                if added > 0 {
                    debug!(query = %lookup, answers = added, "answered");
                    self.stats.record_answered();
                } else {
                    self.stats.record_not_found();
                    response.set_rcode(Rcode::NxDomain);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl QueryHandler for AuthorityHandler {
    async fn handle(&self, query: Message, _context: QueryContext) -> Message {
        let mut response = Message::response_to(&query);

        let _permit = match self.concurrency.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                response.set_rcode(Rcode::ServFail);
                return response;
            }
        };

        let Some(question) = query.questions.first() else {
            self.stats.record_error();
            response.set_rcode(Rcode::FormErr);
            return response;
        };
        if question.qname.is_root() && question.qtype != RecordType::Soa {
            self.stats.record_error();
            response.set_rcode(Rcode::FormErr);
            return response;
        }

        let qname = question.qname.clone();
        let qtype = question.qtype;
        self.answer_question(&mut response, &qname, qtype).await;
        response
    }
}

/// Converts a stored record into a wire resource record of the queried
/// type. A type mismatch yields `None`; malformed stored payloads are
/// errors.
pub fn to_resource_record(
    record: &DnsRecord,
    qtype: RecordType,
) -> Result<Option<ResourceRecord>, String> {
    if record.rtype != qtype {
        return Ok(None);
    }

    let name = Name::from_str(&record.name).map_err(|e| format!("bad name: {e}"))?;
    let rdata = match record.rtype {
        RecordType::A => {
            let addr = record
                .target
                .parse()
                .map_err(|_| format!("bad IPv4 target {:?}", record.target))?;
            RData::A(addr)
        }
        RecordType::Aaaa => {
            let addr = record
                .target
                .parse()
                .map_err(|_| format!("bad IPv6 target {:?}", record.target))?;
            RData::Aaaa(addr)
        }
        RecordType::Cname => {
            RData::Cname(Name::from_str(&record.target).map_err(|e| e.to_string())?)
        }
        RecordType::Ns => RData::Ns(Name::from_str(&record.target).map_err(|e| e.to_string())?),
        RecordType::Ptr => RData::Ptr(Name::from_str(&record.target).map_err(|e| e.to_string())?),
        RecordType::Txt => RData::Txt(vec![record.target.clone()]),
        RecordType::Mx => RData::Mx {
            preference: record.priority.min(u32::from(u16::MAX)) as u16,
            exchange: Name::from_str(&record.target).map_err(|e| e.to_string())?,
        },
        RecordType::Soa => RData::Soa {
            mname: Name::from_str(&record.target).map_err(|e| e.to_string())?,
            rname: Name::from_str(&record.mbox).map_err(|e| e.to_string())?,
            serial: record.serial,
            refresh: record.refresh,
            retry: record.retry,
            expire: record.expire,
            minimum: record.minttl,
        },
        RecordType::Srv => RData::Srv {
            priority: record.priority.min(u32::from(u16::MAX)) as u16,
            weight: record.weight,
            port: record.port,
            target: Name::from_str(&record.target).map_err(|e| e.to_string())?,
        },
        RecordType::Caa => RData::Caa {
            flags: record.priority.min(255) as u8,
            tag: record.tag.clone(),
            value: record.target.clone(),
        },
        RecordType::Tlsa => {
            let fields: Vec<&str> = record.target.split_whitespace().collect();
            let [usage, selector, matching_type, cert_hex] = fields.as_slice() else {
                return Err(format!("bad TLSA target {:?}", record.target));
            };
            RData::Tlsa {
                usage: usage.parse().map_err(|_| "bad TLSA usage".to_string())?,
                selector: selector.parse().map_err(|_| "bad TLSA selector".to_string())?,
                matching_type: matching_type
                    .parse()
                    .map_err(|_| "bad TLSA matching type".to_string())?,
                cert_data: decode_hex(cert_hex)?,
            }
        }
        RecordType::Other(_) => return Ok(None),
    };

    Ok(Some(ResourceRecord::new(name, record.rtype, record.ttl, rdata)))
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err("odd-length hex".to_string());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| "bad hex".to_string()))
        .collect()
}
