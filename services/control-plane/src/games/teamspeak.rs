use std::collections::BTreeMap;

use hearth_model::{
    Deployment, EnvironmentVariable, Gameserver, GameserverDefinition, NetworkPort,
    ResourceRequirements, RunningInstance,
};

use super::{
    primary_endpoint, validate_definition, GameAdapter, GameError, GameMetadata, GameOption,
};

const VERSIONS: &[&str] = &["latest", "3.9"];
const VOICE_PORT: NetworkPort = NetworkPort::udp(9987);
const FILE_TRANSFER_PORT: NetworkPort = NetworkPort::tcp(30033);

pub struct TeamspeakAdapter;

impl GameAdapter for TeamspeakAdapter {
    fn name(&self) -> &'static str {
        "Teamspeak"
    }

    fn metadata(&self) -> GameMetadata {
        GameMetadata {
            name: self.name().to_string(),
            options: VERSIONS
                .iter()
                .map(|v| GameOption {
                    version: v.to_string(),
                    parameters: BTreeMap::new(),
                })
                .collect(),
        }
    }

    fn create_deployment(
        &self,
        definition: &GameserverDefinition,
    ) -> Result<Deployment, GameError> {
        validate_definition(&self.metadata(), definition, 0)?;

        // Voice first: the agent checks address conflicts on the first port.
        Ok(Deployment {
            uuid: definition.uuid,
            image: format!("teamspeak:{}", definition.version),
            env: vec![EnvironmentVariable::new("TS3SERVER_LICENSE", "accept")],
            ports: vec![VOICE_PORT, FILE_TRANSFER_PORT],
            resources: ResourceRequirements::from_mib(128, 64),
            agent: String::new(),
        })
    }

    fn endpoint(
        &self,
        gameserver: &Gameserver,
        instance: Option<&RunningInstance>,
    ) -> Result<String, GameError> {
        primary_endpoint(gameserver, instance, VOICE_PORT)
    }
}
