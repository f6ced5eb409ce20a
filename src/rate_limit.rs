// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-client-IP token bucket admission control for OTP issuance.
//!
//! Each distinct client IP gets its own governor limiter, created lazily and
//! already full, so the first request from a fresh address always passes.
//! Buckets refill one token per configured interval with a burst of one.
//! Entries are never evicted; the map grows with the number of distinct
//! addresses seen.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Map of client IP → token bucket.
pub struct IpRateLimiter {
    quota: Quota,
    limiters: Mutex<HashMap<IpAddr, Arc<DirectLimiter>>>,
}

impl IpRateLimiter {
    /// One token per `interval`, burst of one.
    pub fn new(interval: Duration) -> Self {
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);
        Self {
            quota,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Consume a token for `ip`. Returns `false` when its bucket is empty.
    ///
    /// Never blocks beyond the map lock; the bucket check itself happens
    /// outside the lock.
    pub fn allow(&self, ip: IpAddr) -> bool {
        let limiter = {
            let mut limiters = self.limiters.lock().unwrap_or_else(PoisonError::into_inner);
            limiters
                .entry(ip)
                .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
                .clone()
        };
        limiter.check().is_ok()
    }

    /// Number of client addresses with a bucket.
    pub fn tracked_clients(&self) -> usize {
        self.limiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Client IP from the connection info, or `0.0.0.0` when the server was not
/// started with connect info (as in router tests).
pub fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Middleware rejecting OTP requests from clients whose bucket is empty.
///
/// Rejected requests never reach the handler, so they consume no OTP store
/// capacity.
pub async fn otp_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ip = client_ip(&request);
    if !state.otp_limiter.allow(ip) {
        warn!(client_ip = %ip, "OTP request rate limited");
        return ApiError::too_many_requests("Too many requests, try again later").into_response();
    }
    next.run(request).await
}
