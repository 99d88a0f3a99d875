//! Fleet registration: buses with generated seats, routes, schedules.

use std::sync::Arc;

use chrono::NaiveTime;
use tracing::{info, instrument};

use busline_booking::{RegisterBus, RegisteredBus, Route, Schedule};
use busline_core::{BusId, RouteId, ScheduleId};

use crate::error::BookingError;
use crate::retry::RetryPolicy;
use crate::store::CatalogStore;

pub struct FleetService {
    catalog: Arc<dyn CatalogStore>,
    retry: RetryPolicy,
}

impl FleetService {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            catalog,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the layout and seat count, then store the bus with all its seats.
    #[instrument(skip(self, request), fields(bus_number = %request.bus_number, layout = %request.layout), err)]
    pub async fn register_bus(&self, request: RegisterBus) -> Result<RegisteredBus, BookingError> {
        let registered = request.into_registered(BusId::new())?;
        self.retry
            .bounded("insert_bus", self.catalog.insert_bus(&registered))
            .await?;
        info!(bus_id = %registered.bus.id, seats = registered.seats.len(), "bus registered");
        Ok(registered)
    }

    #[instrument(skip(self), err)]
    pub async fn add_route(
        &self,
        name: &str,
        origin: &str,
        destination: &str,
    ) -> Result<Route, BookingError> {
        let (name, origin, destination) = (name.trim(), origin.trim(), destination.trim());
        if name.is_empty() || origin.is_empty() || destination.is_empty() {
            return Err(BookingError::Validation(
                "route name, origin and destination are required".to_string(),
            ));
        }
        let route = Route {
            id: RouteId::new(),
            name: name.to_string(),
            origin: origin.to_string(),
            destination: destination.to_string(),
        };
        self.retry
            .bounded("insert_route", self.catalog.insert_route(&route))
            .await?;
        Ok(route)
    }

    #[instrument(skip(self), err)]
    pub async fn add_schedule(
        &self,
        bus_id: BusId,
        route_id: RouteId,
        departure_time: NaiveTime,
        arrival_time: Option<NaiveTime>,
        base_price: u64,
    ) -> Result<Schedule, BookingError> {
        let schedule = Schedule {
            id: ScheduleId::new(),
            bus_id,
            route_id,
            departure_time,
            arrival_time,
            base_price,
        };
        self.retry
            .bounded("insert_schedule", self.catalog.insert_schedule(&schedule))
            .await?;
        Ok(schedule)
    }
}
