//! Registration, lookup, login and role conversion.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::{PoisonError, RwLock};

use zeroize::Zeroizing;

use meditrust_crypto::keys;
use meditrust_types::{
    validate_patient_id, Address, Identity, Profile, Role, RoleChange, RoleGroup, UserListing,
    UserSummary,
};

use crate::{RegistryError, Result};

/// Input to [`Registry::register`].
pub struct Registration {
    /// Role name as supplied by the caller.
    pub role: String,
    pub profile: Profile,
    pub patient_id: Option<String>,
    pub specialization: Option<String>,
    /// Register an existing key instead of generating one.
    pub existing_private_key: Option<Zeroizing<String>>,
}

/// A freshly registered identity.
pub struct Registered {
    pub identity: Identity,
    /// Present only when the key pair was generated here. Shown once.
    pub private_key: Option<Zeroizing<String>>,
}

/// An authenticated identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
    /// Reads the private tier without an approved request.
    pub can_access_private: bool,
}

impl From<Identity> for Session {
    fn from(identity: Identity) -> Self {
        Self {
            can_access_private: identity.role.capabilities().private_tier,
            identity,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    identities: BTreeMap<Address, Identity>,
    role_changes: Vec<RoleChange>,
}

/// Registered identities keyed by address.
#[derive(Debug, Default)]
pub struct Registry {
    state: RwLock<State>,
}

/// Treat empty or blank strings as absent.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore persisted identities and their role history.
    pub fn from_parts(identities: Vec<Identity>, role_changes: Vec<RoleChange>) -> Self {
        let identities = identities
            .into_iter()
            .map(|i| (i.address.clone(), i))
            .collect();
        Self {
            state: RwLock::new(State {
                identities,
                role_changes,
            }),
        }
    }

    /// Register a new identity.
    ///
    /// Generates a key pair unless `existing_private_key` is given. `commit`
    /// runs under the write lock before the identity becomes visible.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidRole`] for an unrecognized role name
    /// - [`RegistryError::MissingPatientId`] if the role needs a patient id
    /// - [`RegistryError::InvalidInput`] for other malformed fields
    /// - [`RegistryError::InvalidKey`] if the supplied key is not a valid seed
    /// - [`RegistryError::DuplicateAddress`] if the address is taken
    /// - [`RegistryError::Persistence`] if `commit` fails
    pub fn register<F, E>(
        &self,
        registration: Registration,
        now: u64,
        commit: F,
    ) -> Result<Registered>
    where
        F: FnOnce(&Identity) -> std::result::Result<(), E>,
        E: Display,
    {
        let role: Role = registration
            .role
            .parse()
            .map_err(|_| RegistryError::InvalidRole(registration.role.clone()))?;

        let mut profile = registration.profile;
        profile.name = profile.name.trim().to_string();
        if profile.name.is_empty() {
            return Err(RegistryError::InvalidInput("name is required".into()));
        }

        let patient_id = present(registration.patient_id);
        match (&patient_id, role.requires_patient_id()) {
            (None, true) => return Err(RegistryError::MissingPatientId(role)),
            (Some(pid), true) => validate_patient_id(pid)
                .map_err(|e| RegistryError::InvalidInput(e.to_string()))?,
            (Some(_), false) => {
                return Err(RegistryError::InvalidInput(format!(
                    "role {role} cannot be bound to a patient"
                )))
            }
            (None, false) => {}
        }

        let specialization = present(registration.specialization);
        if specialization.is_some() && role != Role::Doctor {
            return Err(RegistryError::InvalidInput(format!(
                "role {role} cannot carry a specialization"
            )));
        }

        let existing = registration
            .existing_private_key
            .filter(|k| !k.trim().is_empty());
        let (public_key, address, private_key) = match existing {
            Some(secret) => {
                let derived = keys::derive_from_private(secret.trim())?;
                (derived.public_key, derived.address, None)
            }
            None => {
                let generated = keys::generate_keypair();
                (
                    generated.public_key,
                    generated.address,
                    Some(generated.private_key_hex),
                )
            }
        };

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.identities.contains_key(&address) {
            return Err(RegistryError::DuplicateAddress(address));
        }

        let identity = Identity {
            address,
            public_key: public_key.to_bytes(),
            role,
            profile,
            specialization,
            patient_id,
            registered_at: now,
        };

        commit(&identity).map_err(|e| RegistryError::Persistence(e.to_string()))?;
        state
            .identities
            .insert(identity.address.clone(), identity.clone());

        tracing::info!(
            address = %identity.address,
            role = %identity.role,
            generated = private_key.is_some(),
            "identity registered"
        );

        Ok(Registered {
            identity,
            private_key,
        })
    }

    /// Look up an identity by address.
    pub fn resolve(&self, address: &str) -> Result<Identity> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .identities
            .get(address)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownAddress(address.to_string()))
    }

    /// Authenticate by private key.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidKey`] for a malformed key,
    /// [`RegistryError::UnknownAddress`] if the derived address is unregistered.
    pub fn login(&self, private_key_hex: &str) -> Result<Session> {
        let derived = keys::derive_from_private(private_key_hex.trim())?;
        let identity = self.resolve(&derived.address)?;
        tracing::debug!(address = %identity.address, "login");
        Ok(Session::from(identity))
    }

    /// Authenticate by address alone.
    pub fn login_address(&self, address: &str) -> Result<Session> {
        self.resolve(address).map(Session::from)
    }

    /// Flip every `patient` bound to `patient_id` to `ex_patient`.
    ///
    /// Returns every identity bound to the patient after the change. Running
    /// it again changes nothing. `commit` receives the changed identities and
    /// their role-change entries, and is skipped when nothing changes.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownPatient`] if no identity is bound to the patient.
    pub fn convert_patient_to_ex_patient<F, E>(
        &self,
        patient_id: &str,
        now: u64,
        commit: F,
    ) -> Result<Vec<Identity>>
    where
        F: FnOnce(&[Identity], &[RoleChange]) -> std::result::Result<(), E>,
        E: Display,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let bound: Vec<&Identity> = state
            .identities
            .values()
            .filter(|i| i.is_bound_to(patient_id))
            .collect();
        if bound.is_empty() {
            return Err(RegistryError::UnknownPatient(patient_id.to_string()));
        }

        let mut changed = Vec::new();
        let mut changes = Vec::new();
        for identity in bound.into_iter().filter(|i| i.role == Role::Patient) {
            let mut updated = identity.clone();
            updated.role = Role::ExPatient;
            changes.push(RoleChange {
                address: updated.address.clone(),
                from: Role::Patient,
                to: Role::ExPatient,
                changed_at: now,
            });
            changed.push(updated);
        }

        if !changed.is_empty() {
            commit(changed.as_slice(), changes.as_slice())
                .map_err(|e| RegistryError::Persistence(e.to_string()))?;
            for updated in changed {
                tracing::info!(
                    address = %updated.address,
                    patient_id,
                    "patient converted to ex_patient"
                );
                state.identities.insert(updated.address.clone(), updated);
            }
            state.role_changes.extend(changes);
        }

        Ok(state
            .identities
            .values()
            .filter(|i| i.is_bound_to(patient_id))
            .cloned()
            .collect())
    }

    /// Identities bound to a patient.
    pub fn patients(&self, patient_id: &str) -> Vec<Identity> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .identities
            .values()
            .filter(|i| i.is_bound_to(patient_id))
            .cloned()
            .collect()
    }

    /// Every identity grouped by role, in role order.
    pub fn list_users(&self) -> UserListing {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut groups: Vec<RoleGroup> = Role::ALL
            .iter()
            .map(|&role| RoleGroup {
                role,
                count: 0,
                users: Vec::new(),
            })
            .collect();

        for identity in state.identities.values() {
            if let Some(group) = groups.iter_mut().find(|g| g.role == identity.role) {
                group.users.push(UserSummary::from(identity));
                group.count += 1;
            }
        }
        for group in &mut groups {
            group
                .users
                .sort_by(|a, b| (a.registered_at, &a.address).cmp(&(b.registered_at, &b.address)));
        }

        UserListing {
            total: state.identities.len(),
            groups,
        }
    }

    /// Role history, oldest first.
    pub fn role_changes(&self) -> Vec<RoleChange> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .role_changes
            .clone()
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .identities
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
