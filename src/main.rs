use std::{env, path::Path, process::ExitCode};
use ndarray::{Array2, Array4, Ix2, Ix4};
use neural_invariances::{
    config::{Config, MeiConfig, ReceptiveFieldConfig},
    context::{Device, ExecutionContext},
    distribution::{gaussian_noise_image, synthetic_dataset},
    error::{ConfigError, InvariancesError, ShapeError},
    filter::{FilterTensor, LinearFilter, Regularization, RegularizationType},
    mei::{LinearScoringModel, MeiOptimizer, ScoringModel},
    persistence::{load_array, ArraySink, DirectorySink},
    search::{fit_receptive_fields, SearchGranularity},
};


fn load_4d(path: &Path) -> Result<Array4<f64>, InvariancesError> {
    let array = load_array(path)?;
    let ndim = array.ndim();

    array.into_dimensionality::<Ix4>()
        .map_err(|_| ShapeError::FilterNotFourDimensional(ndim).into())
}

fn load_2d(path: &Path) -> Result<Array2<f64>, InvariancesError> {
    let array = load_array(path)?;
    let shape = array.shape().to_vec();

    array.into_dimensionality::<Ix2>()
        .map_err(|_| ShapeError::ImageShapeMismatch { expected: vec![0, 0], found: shape }.into())
}

type Dataset = (Array4<f64>, Array2<f64>, Array4<f64>, Array2<f64>);

fn get_dataset(config: &ReceptiveFieldConfig, context: &mut ExecutionContext) -> Result<Dataset, InvariancesError> {
    match (
        &config.train_images, &config.train_responses,
        &config.validation_images, &config.validation_responses,
    ) {
        (Some(train_images), Some(train_responses), Some(validation_images), Some(validation_responses)) => {
            log::info!("Loading dataset from {}", train_images.display());

            Ok((
                load_4d(train_images)?,
                load_2d(train_responses)?,
                load_4d(validation_images)?,
                load_2d(validation_responses)?,
            ))
        },
        (None, None, None, None) => {
            log::info!(
                "No dataset given, generating {} synthetic images of {}x{} for {} neurons",
                config.synthetic_images, config.height, config.width, config.synthetic_neurons,
            );

            let dataset = synthetic_dataset(
                config.synthetic_images,
                config.synthetic_validation_images,
                config.synthetic_neurons,
                config.height,
                config.width,
                config.noise,
                &mut context.rng,
            );

            Ok((
                dataset.train_images,
                dataset.train_responses,
                dataset.validation_images,
                dataset.validation_responses,
            ))
        },
        _ => Err(ConfigError::Missing(
            String::from("all of train_images, train_responses, validation_images and validation_responses")
        ).into()),
    }
}

fn run_receptive_field(config: &ReceptiveFieldConfig, context: &mut ExecutionContext) -> Result<FilterTensor, InvariancesError> {
    let reg_type: RegularizationType = config.regularization_type.parse()?;
    let granularity: SearchGranularity = config.granularity.parse()?;

    let (train_images, train_responses, validation_images, validation_responses) = get_dataset(config, context)?;

    let neurons = train_responses.ncols();
    let regularization = match granularity {
        SearchGranularity::Global => Regularization::Global(1.),
        SearchGranularity::Individual => Regularization::Individual(vec![1.; neurons]),
    };

    let train = LinearFilter::new(&train_images, train_responses, reg_type, regularization.clone())?;
    let validation = LinearFilter::new(&validation_images, validation_responses, reg_type, regularization)?;

    let fit = fit_receptive_fields(&train, &validation, config.candidate_factors(), granularity, context)?;

    let sink = DirectorySink::new(&config.output_dir)?;
    fit.outcome.persist(&sink.child("hyperparametersearch")?)?;
    fit.evaluation.persist(&sink, config.store_images)?;

    for result in fit.outcome.sorted_descending().iter().take(10) {
        log::info!(
            "neuron: {}, factor: {}, correlation: {:.4}",
            result.neuron, result.factor, result.correlation,
        );
    }
    log::info!("Average correlation: {}", fit.outcome.avg_correlation);
    log::info!("Reports are stored at {}", sink.root().display());

    Ok(fit.filter)
}

fn run_mei(config: &MeiConfig, fitted: Option<FilterTensor>, context: &mut ExecutionContext) -> Result<(), InvariancesError> {
    let filter = match (&config.filter, fitted) {
        (Some(path), _) => FilterTensor::from_dyn(load_array(path)?)?,
        (None, Some(filter)) => filter,
        (None, None) => return Err(ConfigError::Missing(String::from("mei.filter")).into()),
    };

    let shape = filter.shape();
    let model = LinearScoringModel::new(&filter);
    let neurons: Vec<usize> = config.neurons.clone()
        .unwrap_or_else(|| (0..model.neuron_count()).collect());

    let seed = gaussian_noise_image((1, shape.channels, shape.height, shape.width), 0., config.seed_std, &mut context.rng);

    let report = MeiOptimizer::new(&model, config.parameters()).run(&seed, &neurons, context)?;

    for (neuron, err) in report.failures() {
        log::warn!("MEI for neuron {} failed: {}", neuron, err);
    }

    let sink = DirectorySink::new(&config.output_dir)?;
    report.persist(&sink)?;
    sink.store_array("seed_image", &seed.into_dyn())?;

    log::info!("Stored {} MEIs at {}", report.images().count(), sink.root().display());

    Ok(())
}

fn run(config_path: &str) -> Result<(), InvariancesError> {
    let config = Config::from_file(config_path)?;

    let mut context = ExecutionContext::new(
        Device::from_threads(config.execution.threads),
        config.execution.seed,
    );

    let fitted = match &config.receptive_field {
        Some(receptive_field) => Some(run_receptive_field(receptive_field, &mut context)?),
        None => None,
    };

    if let Some(mei) = &config.mei {
        run_mei(mei, fitted, &mut context)?;
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Requires .toml argument file");
        return ExitCode::FAILURE;
    }

    match run(&args[1]) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("{}", err);

            ExitCode::FAILURE
        },
    }
}
