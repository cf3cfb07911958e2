use std::collections::BTreeMap;

use hearth_model::{
    Deployment, EnvironmentVariable, Gameserver, GameserverDefinition, NetworkPort,
    ResourceRequirements, RunningInstance,
};

use super::{
    primary_endpoint, validate_definition, GameAdapter, GameError, GameMetadata, GameOption,
};

const IMAGE: &str = "itzg/minecraft-server";
const VERSIONS: &[&str] = &["1.13.2", "1.14.1"];
const GAME_PORT: NetworkPort = NetworkPort::tcp(25565);
const MAX_MOTD_LEN: usize = 59;

pub struct MinecraftAdapter;

impl GameAdapter for MinecraftAdapter {
    fn name(&self) -> &'static str {
        "Minecraft"
    }

    fn metadata(&self) -> GameMetadata {
        GameMetadata {
            name: self.name().to_string(),
            options: VERSIONS
                .iter()
                .map(|v| GameOption {
                    version: v.to_string(),
                    parameters: BTreeMap::from([(
                        "motd".to_string(),
                        "Message of the day".to_string(),
                    )]),
                })
                .collect(),
        }
    }

    fn create_deployment(
        &self,
        definition: &GameserverDefinition,
    ) -> Result<Deployment, GameError> {
        validate_definition(&self.metadata(), definition, MAX_MOTD_LEN)?;

        let mut env = vec![
            EnvironmentVariable::new("EULA", "TRUE"),
            EnvironmentVariable::new("VERSION", &definition.version),
        ];
        if let Some(motd) = definition.parameters.get("motd") {
            env.push(EnvironmentVariable::new("MOTD", motd));
        }

        Ok(Deployment {
            uuid: definition.uuid,
            image: IMAGE.to_string(),
            env,
            ports: vec![GAME_PORT],
            resources: ResourceRequirements::from_mib(2048, 1536),
            agent: String::new(),
        })
    }

    fn endpoint(
        &self,
        gameserver: &Gameserver,
        instance: Option<&RunningInstance>,
    ) -> Result<String, GameError> {
        primary_endpoint(gameserver, instance, GAME_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::tests::{definition, running};
    use hearth_model::NetworkProtocol;

    #[test]
    fn test_renders_eula_version_and_motd() {
        let def = definition("Minecraft", "1.13.2", &[("motd", "welcome")]);
        let d = MinecraftAdapter.create_deployment(&def).unwrap();

        let env: Vec<_> = d.env.iter().map(|e| (e.name.as_str(), e.value.as_str())).collect();
        assert_eq!(
            env,
            vec![("EULA", "TRUE"), ("VERSION", "1.13.2"), ("MOTD", "welcome")]
        );
        assert_eq!(d.ports, vec![NetworkPort::tcp(25565)]);
        assert_eq!(d.resources.memory_reservation_kib, 1536 * 1024);
        assert_eq!(d.resources.memory_limit_kib, 2048 * 1024);
    }

    #[test]
    fn test_long_motd_rejected() {
        let motd = "x".repeat(MAX_MOTD_LEN + 1);
        let def = definition("Minecraft", "1.14.1", &[("motd", &motd)]);
        assert!(matches!(
            MinecraftAdapter.create_deployment(&def),
            Err(GameError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn test_endpoint() {
        let def = definition("Minecraft", "1.14.1", &[]);
        let deployment = MinecraftAdapter.create_deployment(&def).unwrap();
        let gs = Gameserver {
            definition: def,
            deployment,
        };

        assert_eq!(
            MinecraftAdapter.endpoint(&gs, None),
            Err(GameError::EndpointNotReady(gs.uuid()))
        );

        let wrong_proto = running(gs.uuid(), "10.0.0.1", NetworkProtocol::Udp, 25565, 25565);
        assert!(MinecraftAdapter.endpoint(&gs, Some(&wrong_proto)).is_err());

        let ok = running(gs.uuid(), "10.0.0.1", NetworkProtocol::Tcp, 25565, 25565);
        assert_eq!(
            MinecraftAdapter.endpoint(&gs, Some(&ok)).unwrap(),
            "10.0.0.1:25565"
        );
    }
}
