//! Wire protocol between the scheduler and workers.
//!
//! Every frame is one UTF-8 JSON object tagged by `task`. Unknown tags are
//! logged and discarded by both peers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CircuitInputs, Groth16Proof, ProofFields};

/// The job material a worker needs to run witness and prover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofTaskPayload {
    pub inputs: CircuitInputs,
    pub fields: ProofFields,
}

/// Proof material returned by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofResults {
    pub proof: Groth16Proof,
    pub public: Vec<String>,
}

/// Frames sent from the scheduler to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task")]
pub enum ServerFrame {
    #[serde(rename = "generateProof")]
    GenerateProof {
        #[serde(rename = "proofId")]
        proof_id: Uuid,
        payload: ProofTaskPayload,
    },
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

/// Frames sent from a worker to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task")]
pub enum WorkerFrame {
    #[serde(rename = "generateProof")]
    GenerateProof {
        #[serde(rename = "proofId")]
        proof_id: Uuid,
        results: ProofResults,
    },
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IssBase64Details;

    fn sample_payload() -> ProofTaskPayload {
        ProofTaskPayload {
            inputs: CircuitInputs::default(),
            fields: ProofFields {
                address_seed: "1".into(),
                header: "2".into(),
                iss_base64_details: IssBase64Details {
                    value: "3".into(),
                    index_mod_4: 2,
                },
            },
        }
    }

    #[test]
    fn task_frame_wire_shape() {
        let id = Uuid::new_v4();
        let frame = ServerFrame::GenerateProof {
            proof_id: id,
            payload: sample_payload(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["task"], "generateProof");
        assert_eq!(json["proofId"], id.to_string());
        assert!(json["payload"]["inputs"].is_object());
        assert!(json["payload"]["fields"]["iss_base64_details"].is_object());
    }

    #[test]
    fn reply_frame_wire_shape() {
        let id = Uuid::new_v4();
        let frame = WorkerFrame::GenerateProof {
            proof_id: id,
            results: ProofResults {
                proof: Groth16Proof {
                    pi_a: ["1".into(), "2".into(), "1".into()],
                    pi_b: [
                        ["0".into(), "0".into()],
                        ["0".into(), "0".into()],
                        ["1".into(), "0".into()],
                    ],
                    pi_c: ["3".into(), "4".into(), "1".into()],
                },
                public: vec!["5".into()],
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["task"], "generateProof");
        assert_eq!(json["results"]["public"][0], "5");
        let back: WorkerFrame = serde_json::from_value(json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn heartbeat_frames_are_bare_tags() {
        assert_eq!(
            serde_json::to_string(&ServerFrame::Ping).unwrap(),
            r#"{"task":"ping"}"#
        );
        assert_eq!(
            serde_json::to_string(&WorkerFrame::Pong).unwrap(),
            r#"{"task":"pong"}"#
        );
    }

    #[test]
    fn unknown_task_tag_fails_to_parse() {
        let err = serde_json::from_str::<WorkerFrame>(r#"{"task":"selfDestruct"}"#);
        assert!(err.is_err());
    }
}
