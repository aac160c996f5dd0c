use std::sync::Arc;

use bfv_psi::{
    fhe::bfv::{Ciphertext, SecretKey},
    NoiseObserver, PsiParams, PsiReceiver, PsiSender,
};
use itertools::Itertools;
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

/// Debug-only observer backed by the receiver's secret key. Lives here in
/// the host binary, never inside the protocol engine.
struct NoiseBudgetLogger<'a> {
    sk: &'a SecretKey,
}

impl NoiseObserver for NoiseBudgetLogger<'_> {
    fn observe(&mut self, stage: &str, ct: &Ciphertext) {
        let budget = unsafe { self.sk.measure_noise(ct) };
        match budget {
            Ok(noise) => eprintln!("noise after {}: {}", stage, noise),
            Err(e) => eprintln!("noise measurement failed after {}: {}", stage, e),
        }
    }
}

fn run() {
    let mut rng = ChaChaRng::seed_from_u64(42);

    let receiver_set = vec![2u64, 3, 5, 8];
    let sender_set = vec![
        3u64, 8, 13, 21, 34, 55, 89, 144, 233, 377, 610, 987, 1597, 2584, 4181, 6765,
    ];

    // RECEIVER SIDE //
    println!("Receiver: generating keys and encrypting inputs");
    let now = std::time::Instant::now();
    // on a hashing failure both parties resample seeds and restart the round
    let (params, receiver, inputs, query) = loop {
        let mut params = PsiParams::new(receiver_set.len(), sender_set.len(), 16).unwrap();
        params.generate_seeds(&mut rng);
        let params = Arc::new(params);

        let receiver = PsiReceiver::new(&params, &mut rng);
        let mut inputs = receiver_set.clone();
        match receiver.encrypt_inputs(&mut inputs, &mut rng) {
            Ok(query) => break (params, receiver, inputs, query),
            Err(bfv_psi::Error::CuckooFull) => {
                println!("cuckoo hashing failed, resampling seeds");
            }
            Err(e) => panic!("receiver failed: {}", e),
        }
    };
    let relin_keys = receiver.relin_keys(&mut rng).unwrap();
    println!("Receiver time: {:?}", now.elapsed());
    println!(
        "buckets: {}, bucket capacity: {}, plain modulus: {}, ciphertexts per message: {}",
        params.bucket_count(),
        params.sender_bucket_capacity(),
        params.plain_modulus(),
        params.ciphertext_count()
    );

    // SENDER SIDE //
    println!("Sender: evaluating bucket polynomials");
    let now = std::time::Instant::now();
    let sender = PsiSender::new(&params);
    let mut logger = NoiseBudgetLogger {
        sk: receiver.secret_key(),
    };
    let reply = sender
        .compute_matches(
            &sender_set,
            receiver.public_key(),
            &relin_keys,
            &query,
            Some(&mut logger),
            &mut rng,
        )
        .unwrap();
    println!("Sender time: {:?}", now.elapsed());

    // RECEIVER SIDE //
    let now = std::time::Instant::now();
    let matches = receiver.decrypt_matches(&reply).unwrap();
    let values = matches.iter().map(|&i| inputs[i]).sorted().collect_vec();
    println!("Receiver decryption time: {:?}", now.elapsed());

    println!("Intersection: {:?}", values);
    assert_eq!(values, vec![3, 8]);
}

fn print_parameters() {
    for (receiver_size, sender_size) in [(4usize, 16usize), (16, 256), (256, 4096)] {
        let params = PsiParams::new(receiver_size, sender_size, 16).unwrap();
        println!(
            "receiver {} / sender {}: {} buckets, capacity {}, plain modulus {}, {} ciphertexts",
            receiver_size,
            sender_size,
            params.bucket_count(),
            params.sender_bucket_capacity(),
            params.plain_modulus(),
            params.ciphertext_count()
        );
    }
}

fn main() {
    let val = std::env::args().nth(1).map(|v| {
        v.as_str()
            .parse::<usize>()
            .expect("Choose 1 to run the demo. Choose 2 to display parameter choices")
    });

    match val {
        Some(1) => run(),
        Some(2) => print_parameters(),
        _ => {
            println!("Choose 1 to run the demo. Choose 2 to display parameter choices")
        }
    }
}
