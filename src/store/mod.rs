//! Document store over sled.
//!
//! One tree per collection, JSON-serialized values, stage-prefixed string
//! keys. This is the sole shared mutable resource between workers: all
//! coordination — duplicate suppression, status gating — flows through
//! it. There are no cross-worker locks; the gates substitute
//! check-act-recheck for locking.
//!
//! `created_at` is server-assigned: inserts resolve a `None` timestamp to
//! now at write time, so a `None` read back means the record is still
//! mid-flush (the server-sentinel case the duplicate gates treat as a
//! fresh duplicate).

pub mod warehouse;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::types::{
    AnomalyCase, AnomalyType, Booking, CallContext, CaseStatus, CommunicationCase, DiagnosisCase,
    DiagnosisStatus, EngagementCase, FeedbackCase, HumanReview, ManufacturingCase, PipelineState,
    RcaCase, RcaStatus, SchedulingCase, SchedulingStatus, ServiceCenter, TelemetryEvent, Vehicle,
};

/// Collection names.
pub mod collections {
    pub const TELEMETRY_EVENTS: &str = "telemetry_events";
    pub const ANOMALY_CASES: &str = "anomaly_cases";
    pub const DIAGNOSIS_CASES: &str = "diagnosis_cases";
    pub const RCA_CASES: &str = "rca_cases";
    pub const SCHEDULING_CASES: &str = "scheduling_cases";
    pub const ENGAGEMENT_CASES: &str = "engagement_cases";
    pub const BOOKINGS: &str = "bookings";
    pub const COMMUNICATION_CASES: &str = "communication_cases";
    pub const FEEDBACK_CASES: &str = "feedback_cases";
    pub const MANUFACTURING_CASES: &str = "manufacturing_cases";
    pub const PIPELINE_STATES: &str = "pipeline_states";
    pub const HUMAN_REVIEWS: &str = "human_reviews";
    pub const CALL_CONTEXTS: &str = "call_contexts";
    pub const SERVICE_CENTERS: &str = "service_centers";
    pub const VEHICLES: &str = "vehicles";
}

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("document `{key}` not found in `{collection}`")]
    NotFound {
        collection: &'static str,
        key: String,
    },
}

/// Handle to the document store. Cheap to clone.
#[derive(Clone)]
pub struct DocumentStore {
    db: Arc<sled::Db>,
}

impl DocumentStore {
    /// Open or create the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// In-memory store for tests and local experiments.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db: Arc::new(db) })
    }

    fn tree(&self, collection: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(collection)?)
    }

    /// Write a document verbatim, without touching `created_at`.
    /// Regular inserts should go through the typed helpers.
    pub fn put_raw<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        doc: &T,
    ) -> Result<(), StoreError> {
        let tree = self.tree(collection)?;
        tree.insert(key.as_bytes(), serde_json::to_vec(doc)?)?;
        Ok(())
    }

    /// Fetch one document by key.
    pub fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let tree = self.tree(collection)?;
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Scan a collection in key order, skipping rows that no longer
    /// deserialize (schema drift is not fatal to readers).
    pub fn scan<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, StoreError> {
        let tree = self.tree(collection)?;
        let mut docs = Vec::new();
        for item in tree.iter() {
            let (_key, bytes) = item?;
            if let Ok(doc) = serde_json::from_slice(&bytes) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    fn find_first<T, F>(&self, collection: &str, mut pred: F) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
        F: FnMut(&T) -> bool,
    {
        let tree = self.tree(collection)?;
        for item in tree.iter() {
            let (_key, bytes) = item?;
            if let Ok(doc) = serde_json::from_slice::<T>(&bytes) {
                if pred(&doc) {
                    return Ok(Some(doc));
                }
            }
        }
        Ok(None)
    }

    fn filter<T, F>(&self, collection: &str, mut pred: F) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned,
        F: FnMut(&T) -> bool,
    {
        let mut all = self.scan::<T>(collection)?;
        all.retain(|doc| pred(doc));
        Ok(all)
    }

    fn modify<T, F>(&self, collection: &'static str, key: &str, f: F) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Serialize,
        F: FnOnce(&mut T),
    {
        let mut doc: T = self.get(collection, key)?.ok_or(StoreError::NotFound {
            collection,
            key: key.to_string(),
        })?;
        f(&mut doc);
        self.put_raw(collection, key, &doc)?;
        Ok(doc)
    }

    // ========================================================================
    // Telemetry
    // ========================================================================

    /// Commit a telemetry event, resolving the timestamp sentinel.
    pub fn insert_telemetry(&self, mut event: TelemetryEvent) -> Result<TelemetryEvent, StoreError> {
        event.created_at.get_or_insert_with(Utc::now);
        self.put_raw(collections::TELEMETRY_EVENTS, &event.event_id.clone(), &event)?;
        Ok(event)
    }

    pub fn get_telemetry(&self, event_id: &str) -> Result<Option<TelemetryEvent>, StoreError> {
        self.get(collections::TELEMETRY_EVENTS, event_id)
    }

    /// Last `limit` events for a vehicle, in chronological order.
    pub fn recent_telemetry(
        &self,
        vehicle_id: &str,
        limit: usize,
    ) -> Result<Vec<TelemetryEvent>, StoreError> {
        let mut events =
            self.filter::<TelemetryEvent, _>(collections::TELEMETRY_EVENTS, |e| {
                e.vehicle_id == vehicle_id
            })?;
        events.sort_by_key(|e| e.timestamp_utc);
        if events.len() > limit {
            events.drain(..events.len() - limit);
        }
        Ok(events)
    }

    /// Resolve stored event IDs to events, preserving order and dropping
    /// dangling references.
    pub fn telemetry_by_ids(&self, ids: &[String]) -> Result<Vec<TelemetryEvent>, StoreError> {
        let mut events = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(event) = self.get_telemetry(id)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    // ========================================================================
    // Anomaly cases
    // ========================================================================

    pub fn insert_anomaly_case(&self, mut case: AnomalyCase) -> Result<AnomalyCase, StoreError> {
        case.created_at.get_or_insert_with(Utc::now);
        self.put_raw(collections::ANOMALY_CASES, &case.case_id.clone(), &case)?;
        Ok(case)
    }

    pub fn get_anomaly_case(&self, case_id: &str) -> Result<Option<AnomalyCase>, StoreError> {
        self.get(collections::ANOMALY_CASES, case_id)
    }

    pub fn set_anomaly_status(
        &self,
        case_id: &str,
        status: CaseStatus,
    ) -> Result<AnomalyCase, StoreError> {
        self.modify(collections::ANOMALY_CASES, case_id, |case: &mut AnomalyCase| {
            case.status = status;
        })
    }

    /// Any case for the vehicle already owned by a downstream worker.
    pub fn advanced_case_for_vehicle(
        &self,
        vehicle_id: &str,
    ) -> Result<Option<AnomalyCase>, StoreError> {
        self.find_first(collections::ANOMALY_CASES, |case: &AnomalyCase| {
            case.vehicle_id == vehicle_id && case.status.is_past_pending()
        })
    }

    /// Most recent still-pending case for the vehicle. A sentinel
    /// timestamp sorts as newest.
    pub fn latest_pending_case(
        &self,
        vehicle_id: &str,
    ) -> Result<Option<AnomalyCase>, StoreError> {
        let pending = self.filter::<AnomalyCase, _>(collections::ANOMALY_CASES, |case| {
            case.vehicle_id == vehicle_id && case.status == CaseStatus::PendingDiagnosis
        })?;
        Ok(pending
            .into_iter()
            .max_by_key(|case| case.created_at.unwrap_or(DateTime::<Utc>::MAX_UTC)))
    }

    /// Same anomaly type on the same vehicle, across all statuses.
    pub fn count_vehicle_anomalies(
        &self,
        vehicle_id: &str,
        anomaly_type: AnomalyType,
    ) -> Result<u32, StoreError> {
        let matches = self.filter::<AnomalyCase, _>(collections::ANOMALY_CASES, |case| {
            case.vehicle_id == vehicle_id && case.anomaly_type == Some(anomaly_type)
        })?;
        Ok(matches.len() as u32)
    }

    /// Same anomaly type across the fleet.
    pub fn count_fleet_anomalies(&self, anomaly_type: AnomalyType) -> Result<u32, StoreError> {
        let matches = self.filter::<AnomalyCase, _>(collections::ANOMALY_CASES, |case| {
            case.anomaly_type == Some(anomaly_type)
        })?;
        Ok(matches.len() as u32)
    }

    // ========================================================================
    // Diagnosis cases
    // ========================================================================

    pub fn insert_diagnosis(&self, mut case: DiagnosisCase) -> Result<DiagnosisCase, StoreError> {
        case.created_at.get_or_insert_with(Utc::now);
        self.put_raw(collections::DIAGNOSIS_CASES, &case.diagnosis_id.clone(), &case)?;
        Ok(case)
    }

    pub fn get_diagnosis(&self, diagnosis_id: &str) -> Result<Option<DiagnosisCase>, StoreError> {
        self.get(collections::DIAGNOSIS_CASES, diagnosis_id)
    }

    pub fn diagnosis_for_case(&self, case_id: &str) -> Result<Option<DiagnosisCase>, StoreError> {
        self.find_first(collections::DIAGNOSIS_CASES, |d: &DiagnosisCase| {
            d.case_id == case_id
        })
    }

    pub fn set_diagnosis_status(
        &self,
        diagnosis_id: &str,
        status: DiagnosisStatus,
    ) -> Result<DiagnosisCase, StoreError> {
        self.modify(
            collections::DIAGNOSIS_CASES,
            diagnosis_id,
            |d: &mut DiagnosisCase| d.status = status,
        )
    }

    /// Same component across the fleet's diagnoses.
    pub fn count_component_diagnoses(&self, component: &str) -> Result<u32, StoreError> {
        let matches = self.filter::<DiagnosisCase, _>(collections::DIAGNOSIS_CASES, |d| {
            d.component == component
        })?;
        Ok(matches.len() as u32)
    }

    // ========================================================================
    // RCA cases
    // ========================================================================

    pub fn insert_rca(&self, mut case: RcaCase) -> Result<RcaCase, StoreError> {
        case.created_at.get_or_insert_with(Utc::now);
        self.put_raw(collections::RCA_CASES, &case.rca_id.clone(), &case)?;
        Ok(case)
    }

    pub fn get_rca(&self, rca_id: &str) -> Result<Option<RcaCase>, StoreError> {
        self.get(collections::RCA_CASES, rca_id)
    }

    pub fn rca_for_diagnosis(&self, diagnosis_id: &str) -> Result<Option<RcaCase>, StoreError> {
        self.find_first(collections::RCA_CASES, |r: &RcaCase| {
            r.diagnosis_id == diagnosis_id
        })
    }

    pub fn rca_for_case(&self, case_id: &str) -> Result<Option<RcaCase>, StoreError> {
        self.find_first(collections::RCA_CASES, |r: &RcaCase| r.case_id == case_id)
    }

    pub fn set_rca_status(&self, rca_id: &str, status: RcaStatus) -> Result<RcaCase, StoreError> {
        self.modify(collections::RCA_CASES, rca_id, |r: &mut RcaCase| {
            r.status = status;
        })
    }

    // ========================================================================
    // Scheduling cases
    // ========================================================================

    pub fn insert_scheduling(
        &self,
        mut case: SchedulingCase,
    ) -> Result<SchedulingCase, StoreError> {
        case.created_at.get_or_insert_with(Utc::now);
        self.put_raw(collections::SCHEDULING_CASES, &case.scheduling_id.clone(), &case)?;
        Ok(case)
    }

    pub fn get_scheduling(
        &self,
        scheduling_id: &str,
    ) -> Result<Option<SchedulingCase>, StoreError> {
        self.get(collections::SCHEDULING_CASES, scheduling_id)
    }

    pub fn scheduling_for_rca(&self, rca_id: &str) -> Result<Option<SchedulingCase>, StoreError> {
        self.find_first(collections::SCHEDULING_CASES, |s: &SchedulingCase| {
            s.rca_id == rca_id
        })
    }

    pub fn set_scheduling_status(
        &self,
        scheduling_id: &str,
        status: SchedulingStatus,
    ) -> Result<SchedulingCase, StoreError> {
        self.modify(
            collections::SCHEDULING_CASES,
            scheduling_id,
            |s: &mut SchedulingCase| s.status = status,
        )
    }

    // ========================================================================
    // Engagement, bookings
    // ========================================================================

    pub fn insert_engagement(
        &self,
        mut case: EngagementCase,
    ) -> Result<EngagementCase, StoreError> {
        case.created_at.get_or_insert_with(Utc::now);
        self.put_raw(collections::ENGAGEMENT_CASES, &case.engagement_id.clone(), &case)?;
        Ok(case)
    }

    pub fn get_engagement(
        &self,
        engagement_id: &str,
    ) -> Result<Option<EngagementCase>, StoreError> {
        self.get(collections::ENGAGEMENT_CASES, engagement_id)
    }

    pub fn engagement_for_scheduling(
        &self,
        scheduling_id: &str,
    ) -> Result<Option<EngagementCase>, StoreError> {
        self.find_first(collections::ENGAGEMENT_CASES, |e: &EngagementCase| {
            e.scheduling_id == scheduling_id
        })
    }

    pub fn insert_booking(&self, mut booking: Booking) -> Result<Booking, StoreError> {
        booking.created_at.get_or_insert_with(Utc::now);
        self.put_raw(collections::BOOKINGS, &booking.booking_id.clone(), &booking)?;
        Ok(booking)
    }

    pub fn get_booking(&self, booking_id: &str) -> Result<Option<Booking>, StoreError> {
        self.get(collections::BOOKINGS, booking_id)
    }

    pub fn set_booking_status(
        &self,
        booking_id: &str,
        status: crate::types::BookingStatus,
    ) -> Result<Booking, StoreError> {
        self.modify(collections::BOOKINGS, booking_id, |b: &mut Booking| {
            b.status = status;
        })
    }

    /// Bookings at a service center, any status; callers filter.
    pub fn bookings_for_center(&self, service_center: &str) -> Result<Vec<Booking>, StoreError> {
        self.filter(collections::BOOKINGS, |b: &Booking| {
            b.service_center == service_center
        })
    }

    // ========================================================================
    // Communication
    // ========================================================================

    pub fn insert_communication(
        &self,
        mut case: CommunicationCase,
    ) -> Result<CommunicationCase, StoreError> {
        case.created_at.get_or_insert_with(Utc::now);
        self.put_raw(
            collections::COMMUNICATION_CASES,
            &case.communication_id.clone(),
            &case,
        )?;
        Ok(case)
    }

    pub fn get_communication(
        &self,
        communication_id: &str,
    ) -> Result<Option<CommunicationCase>, StoreError> {
        self.get(collections::COMMUNICATION_CASES, communication_id)
    }

    pub fn communication_for_engagement(
        &self,
        engagement_id: &str,
    ) -> Result<Option<CommunicationCase>, StoreError> {
        self.find_first(collections::COMMUNICATION_CASES, |c: &CommunicationCase| {
            c.engagement_id == engagement_id
        })
    }

    /// Apply an update to a communication case, stamping `updated_at`.
    pub fn update_communication<F>(
        &self,
        communication_id: &str,
        f: F,
    ) -> Result<CommunicationCase, StoreError>
    where
        F: FnOnce(&mut CommunicationCase),
    {
        self.modify(
            collections::COMMUNICATION_CASES,
            communication_id,
            |case: &mut CommunicationCase| {
                f(case);
                case.updated_at = Some(Utc::now());
            },
        )
    }

    // ========================================================================
    // Feedback, manufacturing
    // ========================================================================

    pub fn insert_feedback(&self, mut case: FeedbackCase) -> Result<FeedbackCase, StoreError> {
        case.created_at.get_or_insert_with(Utc::now);
        self.put_raw(collections::FEEDBACK_CASES, &case.feedback_id.clone(), &case)?;
        Ok(case)
    }

    pub fn get_feedback(&self, feedback_id: &str) -> Result<Option<FeedbackCase>, StoreError> {
        self.get(collections::FEEDBACK_CASES, feedback_id)
    }

    pub fn feedback_for_booking(
        &self,
        booking_id: &str,
    ) -> Result<Option<FeedbackCase>, StoreError> {
        self.find_first(collections::FEEDBACK_CASES, |f: &FeedbackCase| {
            f.booking_id == booking_id
        })
    }

    pub fn insert_manufacturing(
        &self,
        mut case: ManufacturingCase,
    ) -> Result<ManufacturingCase, StoreError> {
        case.created_at.get_or_insert_with(Utc::now);
        self.put_raw(
            collections::MANUFACTURING_CASES,
            &case.manufacturing_id.clone(),
            &case,
        )?;
        Ok(case)
    }

    pub fn manufacturing_for_feedback(
        &self,
        feedback_id: &str,
    ) -> Result<Option<ManufacturingCase>, StoreError> {
        self.find_first(collections::MANUFACTURING_CASES, |m: &ManufacturingCase| {
            m.feedback_id == feedback_id
        })
    }

    // ========================================================================
    // Pipeline state, human review, call contexts
    // ========================================================================

    pub fn upsert_pipeline_state(&self, mut state: PipelineState) -> Result<(), StoreError> {
        state.updated_at = Some(Utc::now());
        self.put_raw(collections::PIPELINE_STATES, &state.case_id.clone(), &state)
    }

    pub fn get_pipeline_state(&self, case_id: &str) -> Result<Option<PipelineState>, StoreError> {
        self.get(collections::PIPELINE_STATES, case_id)
    }

    pub fn insert_human_review(&self, mut review: HumanReview) -> Result<(), StoreError> {
        review.created_at.get_or_insert_with(Utc::now);
        self.put_raw(collections::HUMAN_REVIEWS, &review.review_id.clone(), &review)
    }

    pub fn get_human_review(&self, review_id: &str) -> Result<Option<HumanReview>, StoreError> {
        self.get(collections::HUMAN_REVIEWS, review_id)
    }

    pub fn human_reviews(&self) -> Result<Vec<HumanReview>, StoreError> {
        self.scan(collections::HUMAN_REVIEWS)
    }

    pub fn insert_call_context(&self, mut context: CallContext) -> Result<(), StoreError> {
        context.created_at.get_or_insert_with(Utc::now);
        self.put_raw(collections::CALL_CONTEXTS, &context.call_sid.clone(), &context)
    }

    pub fn get_call_context(&self, call_sid: &str) -> Result<Option<CallContext>, StoreError> {
        self.get(collections::CALL_CONTEXTS, call_sid)
    }

    // ========================================================================
    // Registry
    // ========================================================================

    pub fn upsert_service_center(&self, center: &ServiceCenter) -> Result<(), StoreError> {
        self.put_raw(collections::SERVICE_CENTERS, &center.service_center_id, center)
    }

    /// Registry in key order; center selection walks this list.
    pub fn service_centers(&self) -> Result<Vec<ServiceCenter>, StoreError> {
        self.scan(collections::SERVICE_CENTERS)
    }

    pub fn upsert_vehicle(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        self.put_raw(collections::VEHICLES, &vehicle.vehicle_id, vehicle)
    }

    pub fn get_vehicle(&self, vehicle_id: &str) -> Result<Option<Vehicle>, StoreError> {
        self.get(collections::VEHICLES, vehicle_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::mint_id;

    fn sample_event(vehicle: &str, ts_offset_secs: i64) -> TelemetryEvent {
        TelemetryEvent {
            event_id: mint_id("evt"),
            vehicle_id: vehicle.to_string(),
            timestamp_utc: Utc::now() + chrono::Duration::seconds(ts_offset_secs),
            gps_lat: 19.0,
            gps_lon: 72.8,
            speed_kmph: 40.0,
            odometer_km: 1000.0,
            engine_rpm: 2200.0,
            engine_coolant_temp_c: 90.0,
            engine_oil_temp_c: 100.0,
            fuel_level_pct: 60.0,
            battery_soc_pct: 80.0,
            battery_soh_pct: 95.0,
            dtc_codes: vec![],
            created_at: None,
        }
    }

    #[test]
    fn insert_resolves_sentinel_timestamp() {
        let store = DocumentStore::temporary().unwrap();
        let stored = store.insert_telemetry(sample_event("V1", 0)).unwrap();
        assert!(stored.created_at.is_some());
        let read: TelemetryEvent = store.get_telemetry(&stored.event_id).unwrap().unwrap();
        assert!(read.created_at.is_some());
    }

    #[test]
    fn recent_telemetry_is_chronological_and_bounded() {
        let store = DocumentStore::temporary().unwrap();
        for i in 0..15 {
            store.insert_telemetry(sample_event("V1", i)).unwrap();
        }
        store.insert_telemetry(sample_event("V2", 100)).unwrap();

        let window = store.recent_telemetry("V1", 10).unwrap();
        assert_eq!(window.len(), 10);
        assert!(window.windows(2).all(|w| w[0].timestamp_utc <= w[1].timestamp_utc));
        assert!(window.iter().all(|e| e.vehicle_id == "V1"));
    }

    #[test]
    fn status_update_roundtrip() {
        let store = DocumentStore::temporary().unwrap();
        let case = AnomalyCase {
            case_id: mint_id("case"),
            vehicle_id: "V1".to_string(),
            anomaly_detected: true,
            anomaly_type: Some(AnomalyType::ThermalOverheat),
            severity_score: Some(0.8),
            telemetry_event_ids: vec![],
            status: CaseStatus::PendingDiagnosis,
            created_at: None,
        };
        let stored = store.insert_anomaly_case(case).unwrap();
        store
            .set_anomaly_status(&stored.case_id, CaseStatus::Diagnosed)
            .unwrap();
        let read = store.get_anomaly_case(&stored.case_id).unwrap().unwrap();
        assert_eq!(read.status, CaseStatus::Diagnosed);
        assert!(store.advanced_case_for_vehicle("V1").unwrap().is_some());
    }

    #[test]
    fn missing_key_modify_is_not_found() {
        let store = DocumentStore::temporary().unwrap();
        let err = store
            .set_anomaly_status("case_nope", CaseStatus::Diagnosed)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn latest_pending_prefers_sentinel() {
        let store = DocumentStore::temporary().unwrap();
        let mut old = AnomalyCase {
            case_id: mint_id("case"),
            vehicle_id: "V1".to_string(),
            anomaly_detected: true,
            anomaly_type: Some(AnomalyType::DtcFault),
            severity_score: Some(0.5),
            telemetry_event_ids: vec![],
            status: CaseStatus::PendingDiagnosis,
            created_at: Some(Utc::now() - chrono::Duration::seconds(120)),
        };
        store
            .put_raw(collections::ANOMALY_CASES, &old.case_id.clone(), &old)
            .unwrap();
        // A second record still carrying the sentinel.
        old.case_id = mint_id("case");
        old.created_at = None;
        store
            .put_raw(collections::ANOMALY_CASES, &old.case_id.clone(), &old)
            .unwrap();

        let latest = store.latest_pending_case("V1").unwrap().unwrap();
        assert!(latest.created_at.is_none());
    }
}
