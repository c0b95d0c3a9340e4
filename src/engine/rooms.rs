use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::required_text;
use super::{instrumented, rfo_gate, Engine, EngineError};

impl Engine {
    /// Register a room. New rooms start vacant and unoccupied.
    pub async fn create_room(
        &self,
        id: Ulid,
        room_number: &str,
        floor: i32,
    ) -> Result<Room, EngineError> {
        instrumented("create_room", async {
            let _gate = self.begin().await;
            let room_number =
                required_text("room number", room_number, MAX_ROOM_NUMBER_LEN, "room number too long")?;
            if self.store.room_count() >= MAX_ROOMS_PER_PROPERTY {
                return Err(EngineError::LimitExceeded("too many rooms"));
            }
            if self.store.contains_room(&id) {
                return Err(EngineError::AlreadyExists(id));
            }
            if !self.store.reserve_room_number(&room_number, id) {
                return Err(EngineError::DuplicateRoomNumber(room_number));
            }

            let room = Room {
                id,
                room_number: room_number.clone(),
                floor,
                status: RoomStatus::Vacant,
                occupancy: Occupancy::Vacant,
            };
            let event = Event::RoomCreated {
                id,
                room_number: room.room_number.clone(),
                floor,
                status: room.status,
                occupancy: room.occupancy,
            };
            if let Err(e) = self.commit(None, None, vec![event]).await {
                self.store.release_room_number(&room_number, &id);
                return Err(e);
            }
            Ok(room)
        })
        .await
    }

    /// Remove a room that has never been assigned work.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        instrumented("delete_room", async {
            let _gate = self.begin().await;
            let rs = self.room_handle(&id)?;
            let mut guard = rs.write().await;
            if !guard.assignments.is_empty() {
                return Err(EngineError::HasAssignments(id));
            }
            self.commit(Some(&mut *guard), None, vec![Event::RoomDeleted { id }])
                .await
        })
        .await
    }

    /// Front-desk guest presence. Does not touch the housekeeping status.
    pub async fn set_occupancy(&self, id: Ulid, occupancy: Occupancy) -> Result<(), EngineError> {
        instrumented("set_occupancy", async {
            let _gate = self.begin().await;
            let rs = self.room_handle(&id)?;
            let mut guard = rs.write().await;
            if guard.room.occupancy == occupancy {
                return Ok(());
            }
            self.commit(
                Some(&mut *guard),
                None,
                vec![Event::OccupancyChanged { id, occupancy }],
            )
            .await
        })
        .await
    }

    /// Explicit status write. `vacant` passes through the ready-for-occupation gate.
    pub async fn set_room_status(&self, id: Ulid, status: RoomStatus) -> Result<(), EngineError> {
        instrumented("set_room_status", async {
            let _gate = self.begin().await;
            let rs = self.room_handle(&id)?;
            let mut guard = rs.write().await;
            // Gated even when already stored vacant
            if status == RoomStatus::Vacant
                && let Err(blocked) = rfo_gate(id, guard.current_assignment())
            {
                metrics::counter!(observability::RFO_REJECTIONS_TOTAL).increment(1);
                return Err(blocked.into());
            }
            if guard.room.status == status {
                return Ok(());
            }
            self.commit(
                Some(&mut *guard),
                None,
                vec![Event::RoomStatusChanged { id, status }],
            )
            .await
        })
        .await
    }

    /// Whether the room could be released as vacant right now.
    pub async fn can_transition_to_vacant(&self, id: Ulid) -> Result<bool, EngineError> {
        let rs = self.room_handle(&id)?;
        let guard = rs.read().await;
        Ok(rfo_gate(id, guard.current_assignment()).is_ok())
    }
}
