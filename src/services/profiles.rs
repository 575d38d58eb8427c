use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{ChildId, ChildProfile, Interest, Program},
    services::similarity::AgedProfile,
};

/// Read access to the population of child profiles
///
/// The store owns the profiles; the recommendation engine only ever reads
/// versioned snapshots of it. Any change to the population must surface as a
/// new snapshot version.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// Returns the current profile set together with its version
    async fn snapshot(&self) -> AppResult<ProfileSnapshot>;
}

/// An immutable, versioned view of every profile in the store
#[derive(Debug, Clone, Default)]
pub struct ProfileSnapshot {
    version: u64,
    profiles: Arc<BTreeMap<ChildId, ChildProfile>>,
}

impl ProfileSnapshot {
    pub fn new(version: u64, profiles: impl IntoIterator<Item = ChildProfile>) -> Self {
        Self {
            version,
            profiles: Arc::new(profiles.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, id: &ChildId) -> Option<&ChildProfile> {
        self.profiles.get(id)
    }

    /// Looks up a profile that takes part in recommendations
    pub fn active(&self, id: &ChildId) -> Option<&ChildProfile> {
        self.profiles.get(id).filter(|p| p.active)
    }

    /// Active profiles in ascending id order
    pub fn active_profiles(&self) -> impl Iterator<Item = &ChildProfile> {
        self.profiles.values().filter(|p| p.active)
    }

    pub fn aged(&self, id: &ChildId, as_of: NaiveDate) -> Option<AgedProfile<'_>> {
        self.active(id).map(|p| AgedProfile::new(p, as_of))
    }
}

/// Profile store kept entirely in process memory
///
/// Every mutation swaps in a fresh copy of the map under a bumped version, so
/// snapshots handed out earlier never change underneath their readers.
pub struct InMemoryProfileStore {
    current: RwLock<ProfileSnapshot>,
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProfileStore {
    /// Creates an empty store at version 0
    pub fn new() -> Self {
        Self {
            current: RwLock::new(ProfileSnapshot::default()),
        }
    }

    /// Creates a store seeded with the given profiles at version 1
    pub fn from_profiles(profiles: impl IntoIterator<Item = ChildProfile>) -> Self {
        Self {
            current: RwLock::new(ProfileSnapshot::new(1, profiles)),
        }
    }

    pub async fn version(&self) -> u64 {
        self.current.read().await.version
    }

    /// Inserts or replaces a profile, returning the new version
    pub async fn upsert(&self, profile: ChildProfile) -> u64 {
        let mut current = self.current.write().await;
        let mut profiles = (*current.profiles).clone();
        profiles.insert(profile.id, profile);
        Self::commit(&mut current, profiles)
    }

    /// Activates or deactivates a child, returning the resulting version
    pub async fn set_active(&self, id: ChildId, active: bool) -> AppResult<u64> {
        let (_, version) = self
            .edit(id, |profile| {
                let changed = profile.active != active;
                profile.active = active;
                changed
            })
            .await?;
        Ok(version)
    }

    /// Replaces a child's interests, returning the updated profile and version
    pub async fn update_interests(
        &self,
        id: ChildId,
        interests: BTreeSet<Interest>,
    ) -> AppResult<(ChildProfile, u64)> {
        let (profile, version) = self
            .edit(id, |profile| {
                let changed = profile.interests != interests;
                profile.interests = interests;
                changed
            })
            .await?;

        tracing::info!(child_id = %id, version, "Child interests updated");
        Ok((profile, version))
    }

    /// Removes a child from the store, returning the new version
    pub async fn remove(&self, id: ChildId) -> AppResult<u64> {
        let mut current = self.current.write().await;
        if current.get(&id).is_none() {
            return Err(not_found(id));
        }

        let mut profiles = (*current.profiles).clone();
        profiles.remove(&id);
        Ok(Self::commit(&mut current, profiles))
    }

    /// Applies `apply` to one profile under the write lock.
    ///
    /// The closure reports whether it changed anything; the version only
    /// moves when it did.
    async fn edit<F>(&self, id: ChildId, apply: F) -> AppResult<(ChildProfile, u64)>
    where
        F: FnOnce(&mut ChildProfile) -> bool,
    {
        let mut current = self.current.write().await;
        let mut profile = current.get(&id).cloned().ok_or_else(|| not_found(id))?;
        if !apply(&mut profile) {
            return Ok((profile, current.version));
        }

        let mut profiles = (*current.profiles).clone();
        profiles.insert(id, profile.clone());
        let version = Self::commit(&mut current, profiles);
        Ok((profile, version))
    }

    fn commit(current: &mut ProfileSnapshot, profiles: BTreeMap<ChildId, ChildProfile>) -> u64 {
        let version = current.version + 1;
        *current = ProfileSnapshot {
            version,
            profiles: Arc::new(profiles),
        };
        tracing::debug!(version, "Profile set version bumped");
        version
    }
}

fn not_found(id: ChildId) -> AppError {
    AppError::NotFound(format!("Child {} not found", id))
}

#[async_trait::async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn snapshot(&self) -> AppResult<ProfileSnapshot> {
        Ok(self.current.read().await.clone())
    }
}

/// Reads a JSON array of child profiles from disk
pub fn load_profiles_file(path: impl AsRef<Path>) -> anyhow::Result<Vec<ChildProfile>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let profiles: Vec<ChildProfile> = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
    Ok(profiles)
}

/// Small demo roster used when no profile file is configured
pub fn sample_roster() -> Vec<ChildProfile> {
    let child = |n: u128, first: &str, last: &str, dob: (i32, u32, u32), program, gender: &str| {
        let mut profile = ChildProfile::new(
            first,
            last,
            NaiveDate::from_ymd_opt(dob.0, dob.1, dob.2).unwrap_or_default(),
            program,
        );
        profile.id = Uuid::from_u128(n);
        profile.gender = Some(gender.to_string());
        profile
    };

    vec![
        child(1, "Emma", "Johnson", (2020, 3, 15), Program::Preschool, "female").with_interests([
            Interest::ArtsCrafts,
            Interest::Reading,
            Interest::Music,
            Interest::Drawing,
            Interest::Storytelling,
        ]),
        child(2, "Liam", "Smith", (2020, 5, 22), Program::Preschool, "male").with_interests([
            Interest::BuildingBlocks,
            Interest::OutdoorPlay,
            Interest::Sports,
            Interest::Running,
            Interest::Technology,
        ]),
        child(3, "Sophia", "Brown", (2020, 1, 10), Program::Preschool, "female").with_interests([
            Interest::ArtsCrafts,
            Interest::Music,
            Interest::Dancing,
            Interest::Singing,
            Interest::PretendPlay,
        ]),
        child(4, "Noah", "Davis", (2020, 7, 8), Program::Preschool, "male").with_interests([
            Interest::BuildingBlocks,
            Interest::Puzzles,
            Interest::Science,
            Interest::Technology,
            Interest::BoardGames,
        ]),
        child(5, "Olivia", "Wilson", (2020, 4, 30), Program::Preschool, "female").with_interests([
            Interest::Reading,
            Interest::Storytelling,
            Interest::PretendPlay,
            Interest::Animals,
            Interest::Cooking,
        ]),
        child(6, "Mason", "Clark", (2022, 2, 3), Program::Toddler, "male").with_interests([
            Interest::Music,
            Interest::Animals,
            Interest::OutdoorPlay,
        ]),
        child(7, "Ava", "Lewis", (2019, 9, 19), Program::Prekindergarten, "female")
            .with_interests([Interest::Drawing, Interest::Swimming, Interest::Gardening]),
    ]
}
