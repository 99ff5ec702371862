use bridge_bls::{
    hash_to_curve::wb::HASH_TO_G1, PrivateKey, PublicKey, Signature,
};
use rand::thread_rng;

const DOMAIN: &[u8] = b"exmplsig";

fn main() {
    env_logger::init();

    let rng = &mut thread_rng();
    let message = b"checkpoint 42";

    // Five validators sign the same message
    let keys = (0..5).map(|_| PrivateKey::generate(rng)).collect::<Vec<_>>();
    let sigs = keys
        .iter()
        .map(|sk| sk.sign(DOMAIN, message, &*HASH_TO_G1).unwrap())
        .collect::<Vec<_>>();

    // The relayer aggregates the signatures and the verifier aggregates the
    // public keys, so one pairing check covers all five signers
    let asig = Signature::aggregate(&sigs);
    let apk = PublicKey::aggregate(&keys.iter().map(|k| k.to_public()).collect::<Vec<_>>());

    apk.verify(DOMAIN, message, &asig, &*HASH_TO_G1).unwrap();
    println!("aggregate signature verified for 5 signers");

    // A four-of-five aggregate does not verify against the full key
    let partial = Signature::aggregate(&sigs[..4]);
    assert!(apk.verify(DOMAIN, message, &partial, &*HASH_TO_G1).is_err());
    println!("partial aggregate correctly rejected");
}
