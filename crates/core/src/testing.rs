//! Shared fixtures for the service unit tests.

use crate::domain::{CatalogEntry, Patient, Prescription};
use crate::prescriptions::PrescriptionService;
use crate::store::Ledger;
use examflow_types::{Actor, ExamCategory, Role};
use uuid::Uuid;

pub fn doctor() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Doctor)
}

pub fn cashier() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Cashier)
}

pub fn admin() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Admin)
}

pub fn radiologist() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Radiologist)
}

pub fn lab_technician() -> Actor {
    Actor::new(Uuid::new_v4(), Role::LabTechnician)
}

pub fn seed_patient(ledger: &Ledger) -> Patient {
    let patient = Patient {
        id: Uuid::new_v4(),
        number: "PAT-0001".into(),
        first_name: "Ama".into(),
        last_name: "Koffi".into(),
    };
    ledger.insert_patient(patient.clone());
    patient
}

pub fn seed_exam(ledger: &Ledger, code: &str, category: ExamCategory, price: u64) -> Uuid {
    let entry = CatalogEntry {
        id: Uuid::new_v4(),
        code: code.into(),
        name: code.into(),
        category,
        price,
        active: true,
    };
    let id = entry.id;
    ledger.insert_catalog_entry(entry);
    id
}

pub fn seed_inactive_exam(ledger: &Ledger, code: &str, category: ExamCategory, price: u64) -> Uuid {
    let entry = CatalogEntry {
        id: Uuid::new_v4(),
        code: code.into(),
        name: code.into(),
        category,
        price,
        active: false,
    };
    let id = entry.id;
    ledger.insert_catalog_entry(entry);
    id
}

/// One laboratory exam at 5000, created by `doctor`.
pub fn seed_prescription(
    ledger: &Ledger,
    svc: &PrescriptionService,
    doctor: Actor,
) -> Prescription {
    let patient = seed_patient(ledger);
    let exam = seed_exam(ledger, "NFS", ExamCategory::Laboratory, 5000);
    svc.create(patient.id, &[exam], None, doctor)
        .expect("fixture prescription")
}

/// One radiology line and one laboratory line, 15000 + 5000.
pub fn seed_mixed_prescription(
    ledger: &Ledger,
    svc: &PrescriptionService,
    doctor: Actor,
) -> Prescription {
    let patient = seed_patient(ledger);
    let radio = seed_exam(ledger, "RX-THORAX", ExamCategory::Radiology, 15000);
    let lab = seed_exam(ledger, "NFS", ExamCategory::Laboratory, 5000);
    svc.create(patient.id, &[radio, lab], None, doctor)
        .expect("fixture prescription")
}
