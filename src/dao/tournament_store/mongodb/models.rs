use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    IdentityEntity, MatchConfigEntity, MatchDataEntity, MatchEntity, RingEntity, TournamentEntity,
    UserEntity,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTournamentDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    start_date: DateTime,
}

impl From<TournamentEntity> for MongoTournamentDocument {
    fn from(value: TournamentEntity) -> Self {
        Self {
            id: value.id,
            start_date: DateTime::from_system_time(value.start_date),
        }
    }
}

impl From<MongoTournamentDocument> for TournamentEntity {
    fn from(value: MongoTournamentDocument) -> Self {
        Self {
            id: value.id,
            start_date: value.start_date.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    tournament_id: Uuid,
    identity: IdentityEntity,
    name: Option<String>,
    authorised: Option<bool>,
}

impl From<UserEntity> for MongoUserDocument {
    fn from(value: UserEntity) -> Self {
        Self {
            id: value.id,
            tournament_id: value.tournament_id,
            identity: value.identity,
            name: value.name,
            authorised: value.authorised,
        }
    }
}

impl From<MongoUserDocument> for UserEntity {
    fn from(value: MongoUserDocument) -> Self {
        Self {
            id: value.id,
            tournament_id: value.tournament_id,
            identity: value.identity,
            name: value.name,
            authorised: value.authorised,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRingDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    tournament_id: Uuid,
    index: usize,
    jp_id: Option<Uuid>,
    cj_ids: Vec<Uuid>,
    slot_count: usize,
    match_config: MatchConfigEntity,
}

impl From<RingEntity> for MongoRingDocument {
    fn from(value: RingEntity) -> Self {
        Self {
            id: value.id,
            tournament_id: value.tournament_id,
            index: value.index,
            jp_id: value.jp_id,
            cj_ids: value.cj_ids,
            slot_count: value.slot_count,
            match_config: value.match_config,
        }
    }
}

impl From<MongoRingDocument> for RingEntity {
    fn from(value: MongoRingDocument) -> Self {
        Self {
            id: value.id,
            tournament_id: value.tournament_id,
            index: value.index,
            jp_id: value.jp_id,
            cj_ids: value.cj_ids,
            slot_count: value.slot_count,
            match_config: value.match_config,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    ring_id: Uuid,
    config: MatchConfigEntity,
    data: MatchDataEntity,
}

impl From<MatchEntity> for MongoMatchDocument {
    fn from(value: MatchEntity) -> Self {
        Self {
            id: value.id,
            ring_id: value.ring_id,
            config: value.config,
            data: value.data,
        }
    }
}

pub fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
