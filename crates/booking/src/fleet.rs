//! Fleet records the booking core reads: buses, seats, routes, schedules.
//!
//! Administration of these records lives outside this crate; only bus
//! registration is modelled here because it fixes the seat set and seat types
//! that every booking depends on.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use busline_core::{BusId, DomainError, DomainResult, Entity, RouteId, ScheduleId, SeatId, UserId};

use crate::codec::{SeatLabel, SeatLayoutCodec};
use crate::layout::{SeatLayout, SeatType, generate_seats};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub operator_id: UserId,
    /// Registration plate / fleet number; unique across the fleet.
    pub bus_number: String,
    pub name: String,
    pub layout: SeatLayout,
    pub total_seats: u32,
}

impl Entity for Bus {
    type Id = BusId;

    fn id(&self) -> BusId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub bus_id: BusId,
    pub label: SeatLabel,
    pub seat_type: SeatType,
}

impl Entity for Seat {
    type Id = SeatId;

    fn id(&self) -> SeatId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    pub origin: String,
    pub destination: String,
}

impl Entity for Route {
    type Id = RouteId;

    fn id(&self) -> RouteId {
        self.id
    }
}

/// A recurring timetable slot. Combined with a travel date it is one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub bus_id: BusId,
    pub route_id: RouteId,
    pub departure_time: NaiveTime,
    pub arrival_time: Option<NaiveTime>,
    /// Flat per-seat price in the smallest currency unit.
    pub base_price: u64,
}

impl Entity for Schedule {
    type Id = ScheduleId;

    fn id(&self) -> ScheduleId {
        self.id
    }
}

/// Input for registering a bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBus {
    pub operator_id: UserId,
    pub bus_number: String,
    pub name: String,
    pub layout: SeatLayout,
    pub total_seats: u32,
}

/// A validated bus with its complete, generated seat set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredBus {
    pub bus: Bus,
    pub seats: Vec<Seat>,
}

impl RegisterBus {
    /// Validate the request and generate exactly `total_seats` seats.
    pub fn into_registered(self, bus_id: BusId) -> DomainResult<RegisteredBus> {
        let bus_number = self.bus_number.trim().to_string();
        let name = self.name.trim().to_string();
        if bus_number.is_empty() || name.is_empty() {
            return Err(DomainError::validation("bus number and bus name are required"));
        }

        let seats = generate_seats(self.layout, self.total_seats)?
            .into_iter()
            .map(|spec| Seat {
                id: SeatId::new(),
                bus_id,
                label: spec.label,
                seat_type: spec.seat_type,
            })
            .collect();

        Ok(RegisteredBus {
            bus: Bus {
                id: bus_id,
                operator_id: self.operator_id,
                bus_number,
                name,
                layout: self.layout,
                total_seats: self.total_seats,
            },
            seats,
        })
    }
}

impl RegisteredBus {
    pub fn codec(&self) -> SeatLayoutCodec {
        SeatLayoutCodec::new(self.bus.layout, self.seats.iter().map(|s| s.label))
    }
}
