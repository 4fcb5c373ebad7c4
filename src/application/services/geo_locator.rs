//! Nearest-facility lookup
//!
//! Wraps the pure geo functions with the caller's location source. Any
//! failure to get a usable position, including a timeout, is reported as
//! `LocationUnavailable` and never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::geo::{self, Coordinate};
use crate::domain::{DomainError, DomainResult, Facility, RepositoryProvider};

/// Source of the caller's current position.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_location(&self) -> DomainResult<Coordinate>;
}

/// Position supplied with the request itself.
pub struct RequestLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[async_trait]
impl LocationProvider for RequestLocation {
    async fn current_location(&self) -> DomainResult<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Ok(Coordinate::new(lat, lng)),
            _ => Err(DomainError::LocationUnavailable(
                "latitude and longitude are required".into(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FacilityDistance {
    pub facility: Facility,
    pub distance_km: f64,
}

pub struct GeoLocator {
    repos: Arc<dyn RepositoryProvider>,
    timeout: Duration,
}

impl GeoLocator {
    pub fn new(repos: Arc<dyn RepositoryProvider>, timeout: Duration) -> Self {
        Self { repos, timeout }
    }

    /// Closest facility with a known location, or `None` when no facility
    /// has one.
    pub async fn nearest(&self, provider: &dyn LocationProvider) -> DomainResult<Option<FacilityDistance>> {
        let origin = self.locate(provider).await?;
        let facilities = self.repos.occupancy().list_facilities().await?;

        let found = geo::nearest(origin, &facilities, |f| f.location).map(|r| FacilityDistance {
            facility: r.item.clone(),
            distance_km: r.distance_km,
        });
        if let Some(found) = &found {
            debug!(facility_id = %found.facility.id, distance_km = found.distance_km, "Nearest facility");
        }
        Ok(found)
    }

    /// Every located facility by ascending distance.
    pub async fn rank(&self, provider: &dyn LocationProvider) -> DomainResult<Vec<FacilityDistance>> {
        let origin = self.locate(provider).await?;
        let facilities = self.repos.occupancy().list_facilities().await?;

        Ok(geo::rank(origin, &facilities, |f| f.location)
            .into_iter()
            .map(|r| FacilityDistance {
                facility: r.item.clone(),
                distance_km: r.distance_km,
            })
            .collect())
    }

    async fn locate(&self, provider: &dyn LocationProvider) -> DomainResult<Coordinate> {
        let coordinate = match tokio::time::timeout(self.timeout, provider.current_location()).await {
            Ok(Ok(c)) => c,
            Ok(Err(DomainError::LocationUnavailable(reason))) => {
                return Err(DomainError::LocationUnavailable(reason))
            }
            Ok(Err(e)) => return Err(DomainError::LocationUnavailable(e.to_string())),
            Err(_) => {
                return Err(DomainError::LocationUnavailable(format!(
                    "no position within {} ms",
                    self.timeout.as_millis()
                )))
            }
        };
        if !coordinate.is_valid() {
            return Err(DomainError::LocationUnavailable(format!(
                "invalid coordinate ({}, {})",
                coordinate.latitude, coordinate.longitude
            )));
        }
        Ok(coordinate)
    }
}
