//! Model world - the custody rules in their simplest form.

use std::collections::BTreeMap;

use super::operation::{
    ClientId, ModelMaterialId, Operation, OperationError, OperationResult, role_name,
};

/// One material in the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRecord {
    /// Current custodian.
    pub holder: ClientId,
    /// Number of accepted transfers.
    pub last_sequence: u64,
    /// Whether transfers are blocked.
    pub quarantined: bool,
    /// `(from, to)` for every accepted transfer, oldest first.
    pub history: Vec<(ClientId, ClientId)>,
}

/// Observable state for oracle comparison.
///
/// This is the subset of world state that can be compared against the real
/// implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// `(material, holder, last_sequence, quarantined)` ordered by material.
    pub records: Vec<(ModelMaterialId, ClientId, u64, bool)>,
    /// Custody history per material, ordered by material.
    pub histories: Vec<(ModelMaterialId, Vec<(ClientId, ClientId)>)>,
    /// Registered roles ordered by participant.
    pub signers: Vec<(ClientId, String)>,
}

/// Model world - the reference implementation.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    num_clients: usize,
    records: BTreeMap<ModelMaterialId, ModelRecord>,
    signers: BTreeMap<ClientId, String>,
}

impl ModelWorld {
    /// Create a new model world with the given number of participants.
    pub fn new(num_clients: usize) -> Self {
        Self { num_clients, records: BTreeMap::new(), signers: BTreeMap::new() }
    }

    /// Number of participants.
    pub fn num_clients(&self) -> usize {
        self.num_clients
    }

    /// A material's record.
    pub fn record(&self, material: ModelMaterialId) -> Option<&ModelRecord> {
        self.records.get(&material)
    }

    /// Apply an operation and return the result.
    ///
    /// This is the main entry point for model-based testing.
    /// The result should match the real implementation's result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        let result = match *op {
            Operation::Initialize { client_id, material } => {
                self.apply_initialize(client_id, material)
            },
            Operation::Transfer { client_id, material, to } => {
                self.apply_transfer(client_id, material, to)
            },
            Operation::StaleTransfer { client_id, material, to } => {
                self.check_client(to).and_then(|()| self.holder_record(client_id, material)).and(
                    Err(OperationError::StaleSequence),
                )
            },
            Operation::Quarantine { client_id, material } => {
                self.apply_quarantine(client_id, material)
            },
            Operation::Fetch { material } => {
                self.records.get(&material).map(|_| ()).ok_or(OperationError::RecordNotFound)
            },
            Operation::RegisterSigner { client_id, role } => {
                self.check_client(client_id).map(|()| {
                    self.signers.insert(client_id, role_name(role));
                })
            },
        };

        match result {
            Ok(()) => OperationResult::Ok,
            Err(e) => OperationResult::Error(e),
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            records: self
                .records
                .iter()
                .map(|(m, r)| (*m, r.holder, r.last_sequence, r.quarantined))
                .collect(),
            histories: self.records.iter().map(|(m, r)| (*m, r.history.clone())).collect(),
            signers: self.signers.iter().map(|(c, role)| (*c, role.clone())).collect(),
        }
    }

    fn apply_initialize(
        &mut self,
        client_id: ClientId,
        material: ModelMaterialId,
    ) -> Result<(), OperationError> {
        self.check_client(client_id)?;
        if self.records.contains_key(&material) {
            return Err(OperationError::RecordAlreadyExists);
        }

        let record = ModelRecord {
            holder: client_id,
            last_sequence: 0,
            quarantined: false,
            history: vec![],
        };
        self.records.insert(material, record);
        Ok(())
    }

    fn apply_transfer(
        &mut self,
        client_id: ClientId,
        material: ModelMaterialId,
        to: ClientId,
    ) -> Result<(), OperationError> {
        self.check_client(to)?;
        self.holder_record(client_id, material)?;

        let record = self.records.get_mut(&material).ok_or(OperationError::RecordNotFound)?;
        if record.quarantined {
            return Err(OperationError::Quarantined);
        }

        record.history.push((record.holder, to));
        record.holder = to;
        record.last_sequence += 1;
        Ok(())
    }

    fn apply_quarantine(
        &mut self,
        client_id: ClientId,
        material: ModelMaterialId,
    ) -> Result<(), OperationError> {
        self.holder_record(client_id, material)?;

        let record = self.records.get_mut(&material).ok_or(OperationError::RecordNotFound)?;
        record.quarantined = true;
        Ok(())
    }

    /// The record, if it exists and `client_id` holds it.
    fn holder_record(
        &self,
        client_id: ClientId,
        material: ModelMaterialId,
    ) -> Result<&ModelRecord, OperationError> {
        self.check_client(client_id)?;
        let record = self.records.get(&material).ok_or(OperationError::RecordNotFound)?;
        if record.holder != client_id {
            return Err(OperationError::Unauthorized);
        }
        Ok(record)
    }

    fn check_client(&self, client_id: ClientId) -> Result<(), OperationError> {
        if usize::from(client_id) < self.num_clients {
            Ok(())
        } else {
            Err(OperationError::InvalidClient)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_transfer() {
        let mut model = ModelWorld::new(2);

        assert!(model.apply(&Operation::Initialize { client_id: 0, material: 1 }).is_ok());
        assert!(model.apply(&Operation::Transfer { client_id: 0, material: 1, to: 1 }).is_ok());

        let record = model.record(1).cloned();
        assert_eq!(
            record,
            Some(ModelRecord {
                holder: 1,
                last_sequence: 1,
                quarantined: false,
                history: vec![(0, 1)],
            })
        );
    }

    #[test]
    fn only_holder_transfers() {
        let mut model = ModelWorld::new(3);
        model.apply(&Operation::Initialize { client_id: 0, material: 1 });

        let result = model.apply(&Operation::Transfer { client_id: 2, material: 1, to: 2 });
        assert_eq!(result, OperationResult::Error(OperationError::Unauthorized));
    }

    #[test]
    fn quarantine_blocks_transfer_but_not_itself() {
        let mut model = ModelWorld::new(2);
        model.apply(&Operation::Initialize { client_id: 0, material: 1 });

        assert!(model.apply(&Operation::Quarantine { client_id: 0, material: 1 }).is_ok());
        assert!(model.apply(&Operation::Quarantine { client_id: 0, material: 1 }).is_ok());
        assert_eq!(
            model.apply(&Operation::Transfer { client_id: 0, material: 1, to: 1 }),
            OperationResult::Error(OperationError::Quarantined)
        );
    }

    #[test]
    fn stale_transfer_never_applies() {
        let mut model = ModelWorld::new(2);
        model.apply(&Operation::Initialize { client_id: 0, material: 1 });

        assert_eq!(
            model.apply(&Operation::StaleTransfer { client_id: 0, material: 1, to: 1 }),
            OperationResult::Error(OperationError::StaleSequence)
        );
        assert_eq!(model.record(1).map(|r| r.last_sequence), Some(0));
    }

    #[test]
    fn invalid_client_rejected() {
        let mut model = ModelWorld::new(2);
        assert_eq!(
            model.apply(&Operation::Initialize { client_id: 5, material: 1 }),
            OperationResult::Error(OperationError::InvalidClient)
        );
    }
}
