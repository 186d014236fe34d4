//! Query dispatch: decides whether a query is ours, locates the records and
//! writes the answer.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, trace};

use crate::dns::enums::{DNSResourceType, ResponseCode};
use crate::dns::{DNSPacket, MAX_TCP_MESSAGE_SIZE};
use crate::error::{DnsError, Result};
use crate::store::RecordStore;
use crate::synth::{QueryKind, synthesize};
use crate::transfer::{TransferAcl, serve_transfer};
use crate::zone_cache::ZoneNameCache;

pub const PLUGIN_NAME: &str = "redis";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

/// Where a handler writes its response(s).
#[async_trait]
pub trait ResponseWriter: Send {
    fn remote_addr(&self) -> SocketAddr;

    fn transport(&self) -> Transport;

    async fn write_msg(&mut self, msg: &DNSPacket) -> Result<()>;

    /// Takes the connection over: the transport must not serve further
    /// queries on it once the handler returns.
    fn hijack(&mut self);
}

/// A link in the query handling chain.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Serves `req`, returning the response code written, or an error when
    /// nothing was written.
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, req: &DNSPacket)
    -> Result<ResponseCode>;
}

/// Hands the query to `next`, or fails when `from` is the end of the chain.
pub async fn next_or_failure(
    from: &'static str,
    next: Option<&Arc<dyn Handler>>,
    w: &mut dyn ResponseWriter,
    req: &DNSPacket,
) -> Result<ResponseCode> {
    match next {
        Some(handler) => {
            trace!("{} delegating to {}", from, handler.name());
            handler.serve_dns(w, req).await
        }
        None => Err(DnsError::NoNextHandler(from)),
    }
}

#[derive(Debug, Clone)]
pub struct PluginSettings {
    /// EDNS0 payload size advertised in responses
    pub edns_payload_size: u16,
    /// Byte budget of one zone transfer envelope
    pub max_transfer_length: usize,
    pub transfers_enabled: bool,
    pub transfer_acl: TransferAcl,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            edns_payload_size: 1232,
            max_transfer_length: 1000,
            transfers_enabled: true,
            transfer_acl: TransferAcl::allow_all(),
        }
    }
}

/// Authoritative answers for the zones held in the record store.
pub struct RedisPlugin {
    store: Arc<dyn RecordStore>,
    zones: Arc<ZoneNameCache>,
    settings: PluginSettings,
    next: Option<Arc<dyn Handler>>,
}

impl RedisPlugin {
    pub fn new(
        store: Arc<dyn RecordStore>,
        zones: Arc<ZoneNameCache>,
        settings: PluginSettings,
    ) -> Self {
        Self {
            store,
            zones,
            settings,
            next: None,
        }
    }

    pub fn with_next(mut self, next: Arc<dyn Handler>) -> Self {
        self.next = Some(next);
        self
    }

    pub fn zones(&self) -> &Arc<ZoneNameCache> {
        &self.zones
    }

    /// Readiness: true when the record store answers a ping.
    pub async fn ready(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                error!("Record store is not ready: {}", e);
                false
            }
        }
    }

    async fn delegate(&self, w: &mut dyn ResponseWriter, req: &DNSPacket) -> Result<ResponseCode> {
        next_or_failure(PLUGIN_NAME, self.next.as_ref(), w, req).await
    }

    /// Sizes `response` for the requester's transport and writes it.
    async fn respond(
        &self,
        w: &mut dyn ResponseWriter,
        req: &DNSPacket,
        mut response: DNSPacket,
    ) -> Result<()> {
        response.size_and_do(req, self.settings.edns_payload_size);
        let max_size = match w.transport() {
            Transport::Udp => req.max_udp_payload_size() as usize,
            Transport::Tcp => MAX_TCP_MESSAGE_SIZE,
        };
        response.scrub(max_size)?;
        w.write_msg(&response).await
    }

    async fn respond_error(
        &self,
        w: &mut dyn ResponseWriter,
        req: &DNSPacket,
        rcode: ResponseCode,
    ) -> Result<ResponseCode> {
        self.respond(w, req, DNSPacket::error_reply(req, rcode)).await?;
        Ok(rcode)
    }
}

#[async_trait]
impl Handler for RedisPlugin {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    async fn serve_dns(
        &self,
        w: &mut dyn ResponseWriter,
        req: &DNSPacket,
    ) -> Result<ResponseCode> {
        let Some(question) = req.question() else {
            return self.delegate(w, req).await;
        };
        let qname = question.name();
        let qtype = question.qtype;
        if qname.is_empty() || qtype.is_unset() {
            return self.delegate(w, req).await;
        }

        let mut session = match self.store.session().await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to open record store session: {}", e);
                return self.respond_error(w, req, ResponseCode::ServerFailure).await;
            }
        };

        let Some(zone_name) = self.zones.matches(&qname) else {
            debug!("No zone found for {}, passing on", qname);
            return self.delegate(w, req).await;
        };

        let zone = match session.load_zone(&zone_name).await {
            Ok(Some(zone)) => zone,
            Ok(None) => {
                error!("Zone {} is listed but has no data", zone_name);
                return self.respond_error(w, req, ResponseCode::ServerFailure).await;
            }
            Err(e) => {
                error!("Failed to load zone {}: {}", zone_name, e);
                return self.respond_error(w, req, ResponseCode::ServerFailure).await;
            }
        };

        if qtype == DNSResourceType::AXFR {
            let zone_names = self.zones.snapshot();
            return serve_transfer(
                w,
                req,
                &zone,
                session.as_mut(),
                &zone_names,
                &self.settings,
            )
            .await;
        }

        let Some(location) = zone.find_location(&qname) else {
            debug!("{} does not exist in zone {}", qname, zone.name);
            let mut response = DNSPacket::error_reply(req, ResponseCode::NameError);
            response.authorities.push(zone.soa_record());
            self.respond(w, req, response).await?;
            return Ok(ResponseCode::NameError);
        };

        let mut set = match session.load_record_set(&location, &zone).await {
            Ok(set) => set,
            Err(e) => {
                error!("Failed to load {} in zone {}: {}", location, zone.name, e);
                return self.respond_error(w, req, ResponseCode::ServerFailure).await;
            }
        };
        set.make_fqdn(&zone.name);

        let Some(kind) = QueryKind::from_type(qtype) else {
            debug!("Query type {:?} not implemented", qtype);
            return self.respond_error(w, req, ResponseCode::NotImplemented).await;
        };

        let zone_names = self.zones.snapshot();
        let (answers, extras) =
            synthesize(kind, &qname, &zone, &set, &zone_names, session.as_mut()).await;
        trace!(
            "{} {:?}: {} answers, {} extras",
            qname,
            qtype,
            answers.len(),
            extras.len()
        );

        let mut response = DNSPacket::reply(req);
        response.header.aa = true;
        response.header.ra = false;
        response.answers = answers;
        response.resources = extras;
        self.respond(w, req, response).await?;
        Ok(ResponseCode::NoError)
    }
}
