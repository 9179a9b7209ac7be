use crate::diagnose::Diagnosis;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiagnoseReport {
    pub healthy: bool,
    pub diagnoses: Vec<Diagnosis>,
}

impl From<Vec<Diagnosis>> for DiagnoseReport {
    fn from(diagnoses: Vec<Diagnosis>) -> Self {
        Self {
            healthy: diagnoses.iter().all(|d| d.ok),
            diagnoses,
        }
    }
}
